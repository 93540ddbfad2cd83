pub mod simulated;
pub mod traits;

pub use simulated::SimulatedBackend;
pub use traits::TransferBackend;
