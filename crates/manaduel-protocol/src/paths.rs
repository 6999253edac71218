//! Logical store paths used by a room.

use manaduel_store::StorePath;

use crate::{ParticipantId, RoomCode};

const ROOMS: &str = "room";

/// `room/{code}`
pub fn room(code: &RoomCode) -> StorePath {
    StorePath::root().child(ROOMS).child(code.as_str())
}

/// `room/{code}/tick`
pub fn tick(code: &RoomCode) -> StorePath {
    room(code).child("tick")
}

/// `room/{code}/participants`
pub fn participants(code: &RoomCode) -> StorePath {
    room(code).child("participants")
}

/// `room/{code}/participants/{id}`
pub fn participant(code: &RoomCode, id: &ParticipantId) -> StorePath {
    participants(code).child(id.as_str())
}

/// `room/{code}/observers/{id}`
pub fn observer(code: &RoomCode, id: &ParticipantId) -> StorePath {
    room(code).child("observers").child(id.as_str())
}

/// `room/{code}/log`
pub fn log(code: &RoomCode) -> StorePath {
    room(code).child("log")
}
