pub mod cache;
pub mod decode;
pub mod extract;
pub mod features;
pub mod sampler;
pub mod track;
