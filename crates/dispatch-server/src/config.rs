//! Dispatch behaviour switches.

/// Placeholder plate for drivers that did not send one.
pub const DEFAULT_PLATE: &str = "Placa-XXXX";

/// Configuration for the dispatch layer.
///
/// Both switches default to off, which keeps the historical protocol
/// behaviour: unknown lines are dropped silently and drivers are never told
/// that a ride they were offered is gone.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Broadcast `SERVER|CORRIDA_REMOVIDA|<id>` to available drivers when a
    /// pending ride is claimed or cancelled.
    pub announce_withdrawals: bool,
    /// Answer malformed or unknown lines with `SERVER|ERRO|comando invalido`.
    pub reject_unknown: bool,
    /// Plate reported to passengers when the driver sent none.
    pub default_plate: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            announce_withdrawals: false,
            reject_unknown: false,
            default_plate: DEFAULT_PLATE.into(),
        }
    }
}
