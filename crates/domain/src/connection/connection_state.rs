use serde::{Deserialize, Serialize};

/// Lifecycle state of the binding to the remote device service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No live handle and no bind request in flight
    #[default]
    Disconnected,
    /// A bind request was issued, waiting for the platform callback
    Connecting,
    /// The platform reported the binding established; a handle is held
    Connected,
}

impl ConnectionState {
    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Transition to connecting state
    pub fn to_connecting(&self) -> Result<Self, &'static str> {
        match self {
            Self::Disconnected => Ok(Self::Connecting),
            Self::Connecting => Err("Bind request already in flight"),
            Self::Connected => Err("Already connected"),
        }
    }

    /// Transition to connected state.
    ///
    /// The platform is authoritative about the binding, so this is accepted
    /// from any state.
    pub fn to_connected(&self) -> Self {
        Self::Connected
    }

    /// Transition to disconnected state
    pub fn to_disconnected(&self) -> Self {
        Self::Disconnected
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
