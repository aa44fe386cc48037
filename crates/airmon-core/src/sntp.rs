//! SNTPv4 client packets (RFC 4330)
//!
//! Only the unicast client exchange is supported: send [`request`] to port
//! [`NTP_PORT`], feed the 48-byte reply to [`parse_reply`] and hand the result
//! to [`crate::clock::EmbassyClock::synchronize`]. Round-trip delay is not
//! compensated; millisecond accuracy is plenty for sample timestamps.

use thiserror_no_std::Error;

pub const NTP_PORT: u16 = 123;
pub const PACKET_LEN: usize = 48;
pub const DEFAULT_SERVER: &str = "pool.ntp.org";

/// Seconds from the NTP epoch (1900) to the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

const VERSION: u8 = 4;
const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;

/// Bytes 40..48 hold the server's transmit timestamp.
const TRANSMIT_TIMESTAMP: usize = 40;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SntpError {
    #[error("reply is {len} bytes, expected 48")]
    Truncated { len: usize },
    #[error("reply is not from a server (mode {mode})")]
    NotServer { mode: u8 },
    #[error("server is unsynchronized (stratum {stratum})")]
    Unsynchronized { stratum: u8 },
}

/// A client request: no leap indicator, version 4, client mode, all else zero.
pub const fn request() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = (VERSION << 3) | MODE_CLIENT;
    packet
}

/// Milliseconds since the Unix epoch carried in a server reply.
pub fn parse_reply(reply: &[u8]) -> Result<u64, SntpError> {
    if reply.len() < PACKET_LEN {
        return Err(SntpError::Truncated { len: reply.len() });
    }

    let mode = reply[0] & 0b111;
    if mode != MODE_SERVER {
        return Err(SntpError::NotServer { mode });
    }

    // 0 is a kiss-o'-death, 16 and up mean "not synchronized"
    let stratum = reply[1];
    if stratum == 0 || stratum > 15 {
        return Err(SntpError::Unsynchronized { stratum });
    }

    let word = |at: usize| {
        u32::from_be_bytes([reply[at], reply[at + 1], reply[at + 2], reply[at + 3]])
    };
    let seconds = u64::from(word(TRANSMIT_TIMESTAMP));
    let fraction = u64::from(word(TRANSMIT_TIMESTAMP + 4));

    // Seconds below the offset belong to NTP era 1 (from February 2036)
    let unix_secs = if seconds >= NTP_UNIX_OFFSET_SECS {
        seconds - NTP_UNIX_OFFSET_SECS
    } else {
        seconds + (1 << 32) - NTP_UNIX_OFFSET_SECS
    };

    Ok(unix_secs * 1000 + ((fraction * 1000) >> 32))
}
