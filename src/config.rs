//! Immutable configuration record, constructed once and passed by reference.
//!
//! Replaces the source's process-wide mutable globals (safety margin, invite
//! prefixes, decimal counts) with a single value threaded through the trade
//! runner and pre-pay verifier.

/// Tunables for [`crate::repair`]'s numeric argument coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentRepairConfig {
    /// Whether to strip a trailing unit suffix after whitespace (e.g. `"0.12 usdt"`).
    /// Defaults to `false`: reject rather than guess at user intent.
    pub strip_unit_suffix: bool,
    /// Decimal places for USDT atomic amounts.
    pub usdt_decimals: u32,
    /// Decimal places for native lamport atomic amounts.
    pub lamport_decimals: u32,
}

impl Default for ArgumentRepairConfig {
    fn default() -> Self {
        ArgumentRepairConfig {
            strip_unit_suffix: false,
            usdt_decimals: 6,
            lamport_decimals: 9,
        }
    }
}

/// Top-level coordinator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Minimum time the client insists on between `now` and `refund_after_unix`
    /// before it will broadcast a Lightning payment. Default 600s (10 minutes).
    pub safety_margin_secs: i64,
    /// Sidechannel topic prefix that requires an invite to join.
    pub invite_channel_prefix: String,
    /// Public, welcome-gated RFQ rendezvous channel.
    pub rfq_rendezvous_channel: String,
    /// Numeric argument repair tunables.
    pub argument_repair: ArgumentRepairConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            safety_margin_secs: 600,
            invite_channel_prefix: "swap:".to_string(),
            rfq_rendezvous_channel: "0000intercomswapbtcusdt".to_string(),
            argument_repair: ArgumentRepairConfig::default(),
        }
    }
}
