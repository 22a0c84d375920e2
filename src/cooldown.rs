//! Emission rate limiting: daily quota, global and per-symbol cooldowns

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::EngineError;
use crate::types::EmittedSignal;

/// Why a symbol was skipped this cycle. Skips are not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    QuotaExhausted { used: u32, quota: u32 },
    GlobalCooldown { remaining: Duration },
    SymbolCooldown { remaining: Duration },
}

impl SkipReason {
    pub fn to_error(&self, symbol: &str) -> EngineError {
        match self {
            SkipReason::QuotaExhausted { used, quota } => EngineError::QuotaExhausted {
                used: *used,
                quota: *quota,
            },
            SkipReason::GlobalCooldown { remaining } => EngineError::CooldownActive {
                scope: "global".to_string(),
                remaining_secs: remaining.num_seconds(),
            },
            SkipReason::SymbolCooldown { remaining } => EngineError::CooldownActive {
                scope: symbol.to_string(),
                remaining_secs: remaining.num_seconds(),
            },
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::QuotaExhausted { used, quota } => {
                write!(f, "daily quota exhausted ({}/{})", used, quota)
            }
            SkipReason::GlobalCooldown { remaining } => {
                write!(f, "global cooldown, {}s remaining", remaining.num_seconds())
            }
            SkipReason::SymbolCooldown { remaining } => {
                write!(f, "symbol cooldown, {}s remaining", remaining.num_seconds())
            }
        }
    }
}

/// Tracks emissions and answers whether another one may happen now.
///
/// Not synchronized; the scheduler keeps it behind the emission mutex.
#[derive(Debug)]
pub struct EmissionGate {
    global_cooldown: Duration,
    symbol_cooldown: Duration,
    daily_quota: u32,
    /// Offset that defines the local trading day for the quota
    day_offset: FixedOffset,
    last_emission: Option<DateTime<Utc>>,
    last_by_symbol: HashMap<String, DateTime<Utc>>,
    day: Option<NaiveDate>,
    emitted_on_day: u32,
}

impl EmissionGate {
    pub fn new(
        global_cooldown: Duration,
        symbol_cooldown: Duration,
        daily_quota: u32,
        day_offset: FixedOffset,
    ) -> Self {
        Self {
            global_cooldown,
            symbol_cooldown,
            daily_quota,
            day_offset,
            last_emission: None,
            last_by_symbol: HashMap::new(),
            day: None,
            emitted_on_day: 0,
        }
    }

    fn local_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.day_offset).date_naive()
    }

    /// Emissions counted against the quota of the day containing `now`
    pub fn emitted_today(&self, now: DateTime<Utc>) -> u32 {
        if self.day == Some(self.local_day(now)) {
            self.emitted_on_day
        } else {
            0
        }
    }

    pub fn daily_quota(&self) -> u32 {
        self.daily_quota
    }

    /// Quota first, then the global cooldown, then the symbol cooldown
    pub fn check(&self, symbol: &str, now: DateTime<Utc>) -> Result<(), SkipReason> {
        let used = self.emitted_today(now);
        if used >= self.daily_quota {
            return Err(SkipReason::QuotaExhausted {
                used,
                quota: self.daily_quota,
            });
        }

        if let Some(last) = self.last_emission {
            let elapsed = now - last;
            if elapsed < self.global_cooldown {
                return Err(SkipReason::GlobalCooldown {
                    remaining: self.global_cooldown - elapsed,
                });
            }
        }

        if let Some(last) = self.last_by_symbol.get(symbol) {
            let elapsed = now - *last;
            if elapsed < self.symbol_cooldown {
                return Err(SkipReason::SymbolCooldown {
                    remaining: self.symbol_cooldown - elapsed,
                });
            }
        }

        Ok(())
    }

    /// Start both cooldowns and count the emission against the quota
    pub fn record_emission(&mut self, symbol: &str, at: DateTime<Utc>) {
        let day = self.local_day(at);
        if self.day != Some(day) {
            self.day = Some(day);
            self.emitted_on_day = 0;
        }
        self.emitted_on_day += 1;
        self.last_emission = Some(self.last_emission.map_or(at, |prev| prev.max(at)));
        let entry = self.last_by_symbol.entry(symbol.to_string()).or_insert(at);
        *entry = (*entry).max(at);
        debug!(
            "Recorded emission for {} ({} of {} today)",
            symbol, self.emitted_on_day, self.daily_quota
        );
    }

    /// Rebuild cooldown and quota state from previously emitted signals
    pub fn restore<'a>(&mut self, signals: impl IntoIterator<Item = &'a EmittedSignal>) {
        let mut history: Vec<&EmittedSignal> = signals.into_iter().collect();
        history.sort_by_key(|s| s.emitted_at);
        for signal in history {
            self.record_emission(signal.symbol(), signal.emitted_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gate() -> EmissionGate {
        EmissionGate::new(
            Duration::minutes(10),
            Duration::hours(1),
            3,
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_global_cooldown_blocks_other_symbols() {
        let mut gate = gate();
        gate.record_emission("BTC", at(9, 0));

        assert_eq!(
            gate.check("ETH", at(9, 5)),
            Err(SkipReason::GlobalCooldown {
                remaining: Duration::minutes(5)
            })
        );
        assert!(gate.check("ETH", at(9, 10)).is_ok());
    }

    #[test]
    fn test_symbol_cooldown_outlasts_global() {
        let mut gate = gate();
        gate.record_emission("BTC", at(9, 0));

        assert!(matches!(
            gate.check("BTC", at(9, 30)),
            Err(SkipReason::SymbolCooldown { .. })
        ));
        assert!(gate.check("BTC", at(10, 0)).is_ok());
    }

    #[test]
    fn test_daily_quota_resets_next_day() {
        let mut gate = gate();
        gate.record_emission("A", at(1, 0));
        gate.record_emission("B", at(2, 0));
        gate.record_emission("C", at(3, 0));

        assert_eq!(
            gate.check("D", at(4, 0)),
            Err(SkipReason::QuotaExhausted { used: 3, quota: 3 })
        );
        let tomorrow = at(4, 0) + Duration::days(1);
        assert!(gate.check("D", tomorrow).is_ok());
        assert_eq!(gate.emitted_today(tomorrow), 0);
    }

    #[test]
    fn test_quota_day_follows_offset() {
        // UTC-5: 03:00 UTC still belongs to the previous local day
        let mut gate = EmissionGate::new(
            Duration::zero(),
            Duration::zero(),
            1,
            FixedOffset::west_opt(5 * 3600).unwrap(),
        );
        gate.record_emission("A", at(3, 0) - Duration::days(1) + Duration::hours(20));
        assert!(matches!(
            gate.check("B", at(3, 0)),
            Err(SkipReason::QuotaExhausted { .. })
        ));
        assert!(gate.check("B", at(6, 0)).is_ok());
    }

    #[test]
    fn test_skip_reason_maps_to_error() {
        let err = SkipReason::SymbolCooldown {
            remaining: Duration::seconds(42),
        }
        .to_error("SOL");
        assert_eq!(err.kind(), "CooldownActive");
        assert!(err.to_string().contains("SOL"));
    }
}
