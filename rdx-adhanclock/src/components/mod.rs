//! Contains the building blocks of a reconcile pass.
//!
//! `window` turns prayer times into a bounded, ordered set of events, and
//! `rescheduler` diffs that window against the armed set and applies the
//! result through the notification gateway. The `AdhanEngine` drives the
//! rescheduler from its trigger sources.

pub mod rescheduler;
pub mod window;
