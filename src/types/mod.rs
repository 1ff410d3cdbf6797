//! Core value types shared by the registry, sampler and packet codec.
//!
//! - [`ChannelKind`] is the fixed set of channel kinds with their tags, datapoint
//!   widths and capabilities
//! - [`SamplingRate`] validates a rate and derives the sampling period and the
//!   per-packet datapoint capacity
//! - [`time_reached`] and [`is_behind`] compare instants on the wrapping
//!   millisecond clock
//!
//! ```rust
//! use controlino::types::{ChannelKind, DatapointWidth, SamplingRate};
//!
//! let kind = ChannelKind::from_tag('a').unwrap();
//! assert_eq!(kind, ChannelKind::Analog);
//! assert_eq!(kind.datapoint_width(), DatapointWidth::Fixed(2));
//!
//! let rate = SamplingRate::new(40).unwrap();
//! let packets = SamplingRate::new(10).unwrap();
//! assert_eq!(rate.period_ms(), 25);
//! assert_eq!(rate.capacity_per_packet(packets), 4);
//! ```

mod channel_kind;
mod sampling_rate;
mod timing;

pub use channel_kind::{ChannelKind, DatapointWidth, Direction};
pub use sampling_rate::{MAX_SAMPLING_RATE_HZ, SamplingRate};
pub use timing::{Millis, is_behind, time_reached};
