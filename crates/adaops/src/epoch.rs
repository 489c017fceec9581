//! Offline epoch, slot and KES arithmetic from genesis data.
//!
//! Every function takes `now` explicitly; callers pass `OffsetDateTime::now_utc()`.

use serde::{Deserialize, Deserializer};
use std::path::Path;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// First Shelley epoch on mainnet; earlier epochs ran under Byron slot rules.
pub const MAINNET_SHELLEY_START_EPOCH: u64 = 208;

#[derive(Error, Debug)]
pub enum EpochError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse genesis: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid genesis: {0}")]
    InvalidGenesis(&'static str),
    #[error("{now} is before system start {start}")]
    BeforeSystemStart {
        now: OffsetDateTime,
        start: OffsetDateTime,
    },
    #[error("{base} + {seconds}s is outside the supported date range")]
    OutOfRange { base: OffsetDateTime, seconds: f64 },
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EpochError> {
    let raw = std::fs::read_to_string(path).map_err(|source| EpochError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn offset_by(base: OffsetDateTime, seconds: f64) -> Result<OffsetDateTime, EpochError> {
    Duration::checked_seconds_f64(seconds)
        .and_then(|d| base.checked_add(d))
        .ok_or(EpochError::OutOfRange { base, seconds })
}

fn round_tenth(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}

/// Fields of the Shelley genesis file used for time arithmetic.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelleyGenesis {
    #[serde(with = "time::serde::rfc3339")]
    pub system_start: OffsetDateTime,
    /// Slots per epoch.
    pub epoch_length: u64,
    /// Seconds per slot.
    pub slot_length: f64,
    #[serde(rename = "slotsPerKESPeriod")]
    pub slots_per_kes_period: u64,
    #[serde(rename = "maxKESEvolutions", default)]
    pub max_kes_evolutions: u64,
    #[serde(default)]
    pub network_magic: Option<u32>,
}

/// Seconds left on the current KES key and the moment it expires.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KesExpiration {
    pub seconds_remaining: f64,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochBoundary {
    pub epoch: u64,
    pub starts_at: OffsetDateTime,
}

impl ShelleyGenesis {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EpochError> {
        let genesis: Self = load_json(path.as_ref())?;
        genesis.check()?;
        Ok(genesis)
    }

    pub fn check(&self) -> Result<(), EpochError> {
        if self.epoch_length == 0 {
            return Err(EpochError::InvalidGenesis("epochLength must be positive"));
        }
        if self.slot_length <= 0.0 || !self.slot_length.is_finite() {
            return Err(EpochError::InvalidGenesis("slotLength must be positive"));
        }
        if self.slots_per_kes_period == 0 {
            return Err(EpochError::InvalidGenesis(
                "slotsPerKESPeriod must be positive",
            ));
        }
        Ok(())
    }

    /// Epoch duration in seconds.
    pub fn epoch_seconds(&self) -> f64 {
        self.epoch_length as f64 * self.slot_length
    }

    fn since_start(&self, now: OffsetDateTime) -> Result<f64, EpochError> {
        self.check()?;
        if now < self.system_start {
            return Err(EpochError::BeforeSystemStart {
                now,
                start: self.system_start,
            });
        }
        Ok((now - self.system_start).as_seconds_f64())
    }

    pub fn current_epoch(&self, now: OffsetDateTime) -> Result<u64, EpochError> {
        Ok((self.since_start(now)? / self.epoch_seconds()).floor() as u64)
    }

    /// Seconds elapsed in the current epoch, rounded to 0.1.
    pub fn time_in_epoch(&self, now: OffsetDateTime) -> Result<f64, EpochError> {
        let since = self.since_start(now)?;
        let epoch = (since / self.epoch_seconds()).floor();
        Ok(round_tenth(since - epoch * self.epoch_seconds()))
    }

    /// Seconds until the next epoch starts, rounded to 0.1.
    pub fn time_until_next_epoch(&self, now: OffsetDateTime) -> Result<f64, EpochError> {
        let since = self.since_start(now)?;
        let epoch = (since / self.epoch_seconds()).floor();
        Ok(round_tenth(
            self.epoch_seconds() - (since - epoch * self.epoch_seconds()),
        ))
    }

    /// UTC start of `epoch`.
    pub fn epoch_start(&self, epoch: u64) -> Result<OffsetDateTime, EpochError> {
        offset_by(self.system_start, epoch as f64 * self.epoch_seconds())
    }

    /// Start dates of the `count` epochs following the current one.
    pub fn upcoming_epochs(
        &self,
        now: OffsetDateTime,
        count: usize,
    ) -> Result<Vec<EpochBoundary>, EpochError> {
        let current = self.current_epoch(now)?;
        (1..=count as u64)
            .map(|i| {
                let epoch = current.saturating_add(i);
                Ok(EpochBoundary {
                    epoch,
                    starts_at: self.epoch_start(epoch)?,
                })
            })
            .collect()
    }

    pub fn kes_period(&self, slot: u64) -> u64 {
        slot / self.slots_per_kes_period.max(1)
    }

    /// KES periods left for an operational certificate issued at `start_kes_period`.
    pub fn remaining_kes_periods(&self, start_kes_period: u64, current_slot: u64) -> u64 {
        let used = self.kes_period(current_slot).saturating_sub(start_kes_period);
        self.max_kes_evolutions.saturating_sub(used)
    }

    /// Expiry of a KES key with `remaining_periods` full periods left, counted from the
    /// start of the period containing `current_slot`.
    pub fn kes_expiration(
        &self,
        remaining_periods: u64,
        current_slot: u64,
        now: OffsetDateTime,
    ) -> Result<KesExpiration, EpochError> {
        let period_secs = self.slot_length * self.slots_per_kes_period as f64;
        let into_period =
            self.slot_length * (current_slot % self.slots_per_kes_period.max(1)) as f64;
        let seconds_remaining = period_secs * remaining_periods as f64 - into_period;
        Ok(KesExpiration {
            seconds_remaining,
            expires_at: offset_by(now, seconds_remaining)?,
        })
    }

    /// Slot the tip should be at by `now`, for a chain whose Shelley era started at
    /// `shelley_start_epoch` (mainnet: [`MAINNET_SHELLEY_START_EPOCH`]).
    pub fn expected_slot(
        &self,
        byron: &ByronGenesis,
        shelley_start_epoch: u64,
        now: OffsetDateTime,
    ) -> Result<u64, EpochError> {
        self.check()?;
        let byron_slot_secs = byron.slot_duration_ms() as f64 / 1000.0;
        let byron_epoch_slots = byron.epoch_slots();
        let byron_slots = shelley_start_epoch * byron_epoch_slots;
        let byron_end = byron.start_time as f64 + byron_slots as f64 * byron_slot_secs;
        let now_secs = now.unix_timestamp() as f64;
        if now_secs < byron_end {
            return Err(EpochError::BeforeSystemStart {
                now,
                start: OffsetDateTime::from_unix_timestamp(byron_end as i64)
                    .unwrap_or(self.system_start),
            });
        }
        Ok(byron_slots + ((now_secs - byron_end) / self.slot_length).floor() as u64)
    }
}

fn de_u64_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByronProtocolConsts {
    pub k: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByronBlockVersionData {
    /// Milliseconds; serialized as a string in genesis files.
    #[serde(deserialize_with = "de_u64_or_string")]
    pub slot_duration: u64,
}

/// Fields of the Byron genesis file needed to locate the Byron/Shelley boundary.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByronGenesis {
    /// Unix seconds.
    pub start_time: i64,
    pub protocol_consts: ByronProtocolConsts,
    pub block_version_data: ByronBlockVersionData,
}

impl ByronGenesis {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EpochError> {
        load_json(path.as_ref())
    }

    pub fn slot_duration_ms(&self) -> u64 {
        self.block_version_data.slot_duration
    }

    /// Byron epochs are `10 * k` slots.
    pub fn epoch_slots(&self) -> u64 {
        self.protocol_consts.k * 10
    }
}
