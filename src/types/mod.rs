//! Core types for the sender side of the protocol.
//!
//! ## Overview
//!
//! - [`DeviceIdentity`] is the correlation key every `HS`/`ID` message carries
//! - [`FieldKey`] and [`FieldLayout`] select which single-letter fields a record holds
//! - [`SampleValues`] carries up to four positional values for one tick
//! - [`SampleRecord`] is the per-sample mapping that serializes to the collector's text form
//! - [`message`] composes and parses the wire envelope
//! - [`SamplePacing`] times the sampling loop
//!
//! ## Usage Example
//!
//! ```rust
//! use cloudlet::types::{FieldLayout, SampleRecord};
//!
//! let layout = FieldLayout::parse_list("x,y").unwrap();
//! let record = SampleRecord::build(&layout, &(1.5, 2.5).into()).with_index(1);
//! assert_eq!(record.to_canonical_text().unwrap(), r#"{"x":1.5,"y":2.5,"n":1}"#);
//! ```

mod device;
mod field;
pub mod message;
mod pacing;
mod record;

pub use device::{DEVICE_ID_ENV, DeviceIdentity};
pub use field::{FieldKey, FieldLayout, INDEX_KEY, MAX_FIELDS, SampleValues};
pub use message::{Addressed, MessageClass};
pub use pacing::{DEFAULT_SAMPLE_PAUSE, SamplePacing};
pub use record::SampleRecord;
