//! Subscription Tiers - Fixed service-level table.
//!
//! Seven tiers ranked 1 (freemium) through 7 (institutional elite). Every
//! tier-dependent decision in the gateway (staleness tolerance, cache TTLs,
//! request quotas, batch limits, streaming access) reads from this table.

use std::time::Duration;

// =============================================================================
// Data Tier
// =============================================================================

/// Subscription tier identifying a class of downstream consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataTier {
    /// Rank 1 - free access, hour-old data is acceptable.
    Freemium,
    /// Rank 2 - delayed data during market hours.
    MarketHoursPro,
    /// Rank 3 - delayed data with wider quotas.
    SectorSpecialist,
    /// Rank 4 - five-minute staleness tolerance.
    WeekendWarrior,
    /// Rank 5 - five-minute staleness, large batches.
    DarkPoolInsider,
    /// Rank 6 - one-minute staleness, high request volume.
    AlgorithmicTrader,
    /// Rank 7 - near-real-time with the highest quotas.
    InstitutionalElite,
}

/// Per-tier policy values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierConfig {
    /// Numeric rank (1 = lowest).
    pub rank: u8,
    /// Canonical lowercase name.
    pub name: &'static str,
    /// Maximum acceptable quote age before a cached quote is too stale.
    pub real_time_delay: Duration,
    /// Cache TTL for historical aggregate data.
    pub historical_cache_ttl: Duration,
    /// Cache TTL for news results.
    pub news_cache_ttl: Duration,
    /// Sliding-window request quota per 60 seconds.
    pub rate_limit_per_minute: u32,
    /// Maximum number of symbols in a single batch quote request.
    pub batch_size_limit: usize,
    /// Whether the tier may open a streaming WebSocket session.
    pub streaming_enabled: bool,
}

const TIER_CONFIGS: [TierConfig; 7] = [
    TierConfig {
        rank: 1,
        name: "freemium",
        real_time_delay: Duration::from_secs(3600),
        historical_cache_ttl: Duration::from_secs(86_400),
        news_cache_ttl: Duration::from_secs(7200),
        rate_limit_per_minute: 10,
        batch_size_limit: 5,
        streaming_enabled: false,
    },
    TierConfig {
        rank: 2,
        name: "market_hours_pro",
        real_time_delay: Duration::from_secs(900),
        historical_cache_ttl: Duration::from_secs(3600),
        news_cache_ttl: Duration::from_secs(1800),
        rate_limit_per_minute: 30,
        batch_size_limit: 10,
        streaming_enabled: true,
    },
    TierConfig {
        rank: 3,
        name: "sector_specialist",
        real_time_delay: Duration::from_secs(900),
        historical_cache_ttl: Duration::from_secs(3600),
        news_cache_ttl: Duration::from_secs(1800),
        rate_limit_per_minute: 50,
        batch_size_limit: 25,
        streaming_enabled: true,
    },
    TierConfig {
        rank: 4,
        name: "weekend_warrior",
        real_time_delay: Duration::from_secs(300),
        historical_cache_ttl: Duration::from_secs(1800),
        news_cache_ttl: Duration::from_secs(900),
        rate_limit_per_minute: 100,
        batch_size_limit: 50,
        streaming_enabled: true,
    },
    TierConfig {
        rank: 5,
        name: "dark_pool_insider",
        real_time_delay: Duration::from_secs(300),
        historical_cache_ttl: Duration::from_secs(1800),
        news_cache_ttl: Duration::from_secs(900),
        rate_limit_per_minute: 200,
        batch_size_limit: 100,
        streaming_enabled: true,
    },
    TierConfig {
        rank: 6,
        name: "algorithmic_trader",
        real_time_delay: Duration::from_secs(60),
        historical_cache_ttl: Duration::from_secs(300),
        news_cache_ttl: Duration::from_secs(300),
        rate_limit_per_minute: 500,
        batch_size_limit: 200,
        streaming_enabled: true,
    },
    TierConfig {
        rank: 7,
        name: "institutional_elite",
        real_time_delay: Duration::from_secs(30),
        historical_cache_ttl: Duration::from_secs(300),
        news_cache_ttl: Duration::from_secs(300),
        rate_limit_per_minute: 1000,
        batch_size_limit: 500,
        streaming_enabled: true,
    },
];

impl DataTier {
    /// All tiers in rank order.
    pub const ALL: [Self; 7] = [
        Self::Freemium,
        Self::MarketHoursPro,
        Self::SectorSpecialist,
        Self::WeekendWarrior,
        Self::DarkPoolInsider,
        Self::AlgorithmicTrader,
        Self::InstitutionalElite,
    ];

    /// Resolve a tier from its numeric rank. Unknown ranks fall back to
    /// [`DataTier::Freemium`].
    #[must_use]
    pub const fn from_rank(rank: u8) -> Self {
        match rank {
            2 => Self::MarketHoursPro,
            3 => Self::SectorSpecialist,
            4 => Self::WeekendWarrior,
            5 => Self::DarkPoolInsider,
            6 => Self::AlgorithmicTrader,
            7 => Self::InstitutionalElite,
            _ => Self::Freemium,
        }
    }

    /// Resolve a tier from its canonical name (case-insensitive). Unknown
    /// names fall back to [`DataTier::Freemium`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "market_hours_pro" => Self::MarketHoursPro,
            "sector_specialist" => Self::SectorSpecialist,
            "weekend_warrior" => Self::WeekendWarrior,
            "dark_pool_insider" => Self::DarkPoolInsider,
            "algorithmic_trader" => Self::AlgorithmicTrader,
            "institutional_elite" => Self::InstitutionalElite,
            _ => Self::Freemium,
        }
    }

    /// Policy values for this tier.
    #[must_use]
    pub const fn config(self) -> &'static TierConfig {
        match self {
            Self::Freemium => &TIER_CONFIGS[0],
            Self::MarketHoursPro => &TIER_CONFIGS[1],
            Self::SectorSpecialist => &TIER_CONFIGS[2],
            Self::WeekendWarrior => &TIER_CONFIGS[3],
            Self::DarkPoolInsider => &TIER_CONFIGS[4],
            Self::AlgorithmicTrader => &TIER_CONFIGS[5],
            Self::InstitutionalElite => &TIER_CONFIGS[6],
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.config().name
    }

    /// Numeric rank (1 = lowest).
    #[must_use]
    pub const fn rank(self) -> u8 {
        self.config().rank
    }
}

impl Default for DataTier {
    fn default() -> Self {
        Self::Freemium
    }
}

impl std::fmt::Display for DataTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================
