pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PRELOAD_REFRESH_MS: u64 = 300_000;
pub const DEFAULT_PRELOAD_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MIN_SHOW_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_PROVIDER_WEIGHT: u32 = 50;

pub const DEFAULT_REWARD_COINS: u64 = 10;
pub const DEFAULT_REWARD_REASON: &str = "rewarded_ad";
pub const DEFAULT_CONTENT_TYPE: &str = "episode";

pub const ANALYTICS_EVENT_AD_OUTCOME: &str = "ad_outcome";

pub const STORE_KEY_ROUND_ROBIN_CURSOR: &str = "mediation-round-robin-cursor";
pub const STORE_KEY_LAST_ORDER: &str = "mediation-last-order";

pub const ENV_PREFIX: &str = "AD_MEDIATION";
