//! Repositories over a borrowed connection.

pub mod reservations;

pub use reservations::Reservations;
