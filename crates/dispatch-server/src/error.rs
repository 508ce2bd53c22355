//! Business rule violations reported back to the offending client.

use dispatch_protocol::{RideId, ServerMessage};
use thiserror::Error;

/// A request that was understood but not allowed. `Display` is the text of
/// the `SERVER|ERRO|...` line sent back; nothing else changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{driver} ja está em uma corrida e não pode aceitar outra.")]
    AlreadyOnRide { driver: String },

    #[error("Corrida não disponível")]
    RideUnavailable,

    #[error("Voce nao esta em nenhuma corrida para finalizar.")]
    NotOnRide,

    #[error("Voce precisa ficar online antes de aceitar corridas.")]
    NotOnline,

    #[error("Voce ja possui a corrida {ride_id} em andamento.")]
    AlreadyWaiting { ride_id: RideId },

    #[error("Esta conexao ja esta registrada como {role}.")]
    RoleConflict { role: &'static str },

    #[error("comando invalido")]
    InvalidCommand,
}

impl Rejection {
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.to_string())
    }
}
