//! Role and command name constants.
//!
//! Each constant is the exact string sent over the wire in the first or
//! second field of a line.

/// Sender roles (first field of every line).
pub struct Roles;

impl Roles {
    pub const DRIVER: &str = "MOTORISTA";
    pub const PASSENGER: &str = "PASSAGEIRO";
    pub const SERVER: &str = "SERVER";
}

/// Command and message kinds (second field of every line).
pub struct Commands;

impl Commands {
    // ── Driver → server ─────────────────────────────────────────────────
    pub const ONLINE: &str = "ONLINE";
    pub const ACCEPT: &str = "ACEITAR";
    pub const FINISH: &str = "FINALIZAR";

    // ── Passenger → server ──────────────────────────────────────────────
    pub const REQUEST: &str = "PEDIR";

    // ── Server → client ─────────────────────────────────────────────────
    pub const OK: &str = "OK";
    pub const ERROR: &str = "ERRO";
    pub const NEW_RIDE: &str = "NOVA_CORRIDA";
    pub const RIDE_WITHDRAWN: &str = "CORRIDA_REMOVIDA";
}
