//! Protector against replay (reflection) attacks
//!
//! Every salt generated for sending is recorded. A received packet carrying one of
//! those salts is one of our own packets reflected back at us, and is rejected before
//! decryption is attempted.
//!
//! Salts of received packets are never recorded, so replays of a peer's packets are
//! left to the AEAD layer.

use std::{env, fmt, io};

use cfg_if::cfg_if;
use log::{debug, warn};
use serde::Deserialize;

#[cfg(feature = "security-replay-attack-detect")]
use self::bloom_ring::BloomRing;

#[cfg(feature = "security-replay-attack-detect")]
mod bloom_ring;

/// Default number of salts remembered
pub const DEFAULT_CAPACITY: usize = 1_000_000;

/// Default false positive rate of the bloom filters
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 1e-6;

/// Default number of bloom filters in the ring
pub const DEFAULT_SLOTS: usize = 10;

const ENV_CAPACITY: &str = "SHADOWSOCKS_SF_CAPACITY";
const ENV_FALSE_POSITIVE_RATE: &str = "SHADOWSOCKS_SF_FPR";
const ENV_SLOTS: &str = "SHADOWSOCKS_SF_SLOT";

/// Sizing of `ReplayProtector`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Number of salts remembered, `0` disables the protector
    pub capacity: usize,
    /// False positive rate of each bloom filter
    pub false_positive_rate: f64,
    /// Number of bloom filters, the oldest one is recycled when the newest is full
    pub slots: usize,
}

impl Default for ReplayConfig {
    fn default() -> ReplayConfig {
        ReplayConfig {
            capacity: DEFAULT_CAPACITY,
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            slots: DEFAULT_SLOTS,
        }
    }
}

impl ReplayConfig {
    /// Default configuration overridden by `SHADOWSOCKS_SF_CAPACITY`, `SHADOWSOCKS_SF_FPR` and `SHADOWSOCKS_SF_SLOT`
    pub fn from_env() -> ReplayConfig {
        ReplayConfig::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> ReplayConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ReplayConfig::default();

        if let Some(capacity) = parse_var(&lookup, ENV_CAPACITY) {
            config.capacity = capacity;
        }
        if let Some(fpr) = parse_var::<f64, _>(&lookup, ENV_FALSE_POSITIVE_RATE) {
            if fpr > 0.0 && fpr < 1.0 {
                config.false_positive_rate = fpr;
            } else {
                warn!("{}={} out of range (0, 1), using {}", ENV_FALSE_POSITIVE_RATE, fpr, DEFAULT_FALSE_POSITIVE_RATE);
            }
        }
        if let Some(slots) = parse_var::<usize, _>(&lookup, ENV_SLOTS) {
            if slots > 0 {
                config.slots = slots;
            } else {
                warn!("{}=0 is invalid, using {}", ENV_SLOTS, DEFAULT_SLOTS);
            }
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)?;
    match value.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(err) => {
            warn!("invalid {}={:?}, error: {}, ignored", name, value, err);
            None
        }
    }
}

/// A bloom filter based protector against replay attack
///
/// Shared by every packet codec call of a process. All methods take `&self` and are safe to call concurrently.
pub struct ReplayProtector {
    // Check for salts sent by ourselves, for preventing reflection attack
    // https://github.com/shadowsocks/shadowsocks-org/issues/44
    #[cfg(feature = "security-replay-attack-detect")]
    salt_bloom: Option<spin::Mutex<BloomRing>>,
}

impl fmt::Debug for ReplayProtector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReplayProtector").finish()
    }
}

impl ReplayProtector {
    /// Create a new `ReplayProtector`
    #[allow(unused_variables)]
    pub fn new(config: &ReplayConfig) -> io::Result<ReplayProtector> {
        // NaN fails this as well
        if !(config.false_positive_rate > 0.0 && config.false_positive_rate < 1.0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("false positive rate {} out of range (0, 1)", config.false_positive_rate),
            ));
        }

        cfg_if! {
            if #[cfg(feature = "security-replay-attack-detect")] {
                let salt_bloom = if config.capacity == 0 {
                    debug!("replay protector disabled with capacity 0");
                    None
                } else {
                    let ring = BloomRing::new(config.slots, config.capacity, config.false_positive_rate)
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
                    Some(spin::Mutex::new(ring))
                };

                Ok(ReplayProtector { salt_bloom })
            } else {
                debug!("replay protector disabled at compile time");
                Ok(ReplayProtector {})
            }
        }
    }

    /// Remember `salt`. Always succeeds, adding the same salt twice is harmless.
    #[allow(unused_variables)]
    pub fn add_salt(&self, salt: &[u8]) {
        // Plain packets don't have a salt
        if salt.is_empty() {
            return;
        }

        #[cfg(feature = "security-replay-attack-detect")]
        if let Some(ref bloom) = self.salt_bloom {
            bloom.lock().add(salt);
        }
    }

    /// Check if `salt` was remembered
    #[allow(unused_variables)]
    pub fn contains_salt(&self, salt: &[u8]) -> bool {
        if salt.is_empty() {
            return false;
        }

        cfg_if! {
            if #[cfg(feature = "security-replay-attack-detect")] {
                match self.salt_bloom {
                    Some(ref bloom) => bloom.lock().check(salt),
                    None => false,
                }
            } else {
                false
            }
        }
    }
}
