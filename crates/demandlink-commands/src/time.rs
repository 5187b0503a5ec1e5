//! GPS epoch time codec.
//!
//! Time-bearing commands carry a 32-bit unsigned count of seconds since the
//! GPS epoch (1980-01-06T00:00:00Z). GPS time does not observe leap seconds,
//! so it runs ahead of UTC by a fixed offset.

use chrono::{DateTime, Utc};

use crate::error::EncodingError;

/// Unix timestamp of the GPS epoch, 1980-01-06T00:00:00Z.
pub const GPS_EPOCH_UNIX_SECS: i64 = 315_964_800;

/// Leap seconds between GPS time and UTC (unchanged since 2017-01-01).
pub const GPS_LEAP_SECONDS: i64 = 18;

/// Wire value for "no time specified".
pub const NO_TIME: u32 = 0;

/// Convert a UTC timestamp into the protocol's GPS epoch counter.
///
/// `None` encodes as [`NO_TIME`]. Sub-second precision is truncated.
pub fn to_gps_epoch(time: Option<DateTime<Utc>>) -> Result<u32, EncodingError> {
    let Some(time) = time else {
        return Ok(NO_TIME);
    };

    // A present time must not collide with the "no time" marker.
    let seconds = time.timestamp() - GPS_EPOCH_UNIX_SECS + GPS_LEAP_SECONDS;
    u32::try_from(seconds)
        .ok()
        .filter(|&epoch| epoch != NO_TIME)
        .ok_or(EncodingError::TimeOutOfRange { seconds })
}

/// Convert a GPS epoch counter back into UTC. [`NO_TIME`] maps to `None`.
pub fn from_gps_epoch(epoch: u32) -> Option<DateTime<Utc>> {
    if epoch == NO_TIME {
        return None;
    }
    DateTime::from_timestamp(i64::from(epoch) + GPS_EPOCH_UNIX_SECS - GPS_LEAP_SECONDS, 0)
}
