//! Database types, serialised the way they are stored:
//!
//! - IDs are native `ObjectId`s.
//! - Datetimes are native BSON datetimes.
//!
//! Each record type comes in a `*Core` (no ID, insertable) and a full
//! (with ID, readable) flavour sharing one collection.

pub mod poll;
pub mod user;
pub mod vote;

pub use poll::{NewPoll, Poll, PollOption};
pub use user::{NewUser, User};
pub use vote::{NewVote, Vote};
