pub mod crypto;
pub mod decode;
pub mod encode;
