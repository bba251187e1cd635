pub mod guard;
mod supervisor;

pub use supervisor::ConnectionSupervisor;
