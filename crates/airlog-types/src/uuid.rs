//! Bluetooth UUIDs of the channels the core consumes.
//!
//! The transport maps logical channels onto these GATT characteristics.

use uuid::{Uuid, uuid};

/// Current readings characteristic (detailed, includes interval and age).
pub const CURRENT_READINGS: Uuid = uuid!("f0cd3001-95da-4f4b-9ac8-aa55d312af0c");

/// Total number of readings stored in device memory.
pub const TOTAL_READINGS: Uuid = uuid!("f0cd2001-95da-4f4b-9ac8-aa55d312af0c");

/// Measurement interval.
pub const READ_INTERVAL: Uuid = uuid!("f0cd2002-95da-4f4b-9ac8-aa55d312af0c");

/// Seconds since last measurement.
pub const SECONDS_SINCE_UPDATE: Uuid = uuid!("f0cd2004-95da-4f4b-9ac8-aa55d312af0c");

/// History data characteristic (read/notify).
pub const HISTORY: Uuid = uuid!("f0cd2005-95da-4f4b-9ac8-aa55d312af0c");

/// Command characteristic for device control.
pub const COMMAND: Uuid = uuid!("f0cd1402-95da-4f4b-9ac8-aa55d312af0c");
