/// Notified with the remote version every time the service becomes usable
pub trait ReadyListener: Send + Sync {
    fn on_ready(&self, version: &str);
}

impl<F> ReadyListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_ready(&self, version: &str) {
        self(version)
    }
}
