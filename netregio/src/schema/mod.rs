mod registration;
mod relay;

pub use registration::*;
pub use relay::*;
