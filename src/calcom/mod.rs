//! Calendar provider abstraction and the Cal.com implementation
//!
//! `types` holds the value objects, `client` the `CalendarProvider`
//! trait and the Cal.com REST client behind it.

pub mod client;
pub mod types;

pub use client::{BookingRequest, CalComClient, CalendarProvider};
pub use types::{Attendee, Booking, EventType, Slot};
