/// H.265/HEVC framing and decoder front end
pub mod h265;

pub use h265::H265Decoder;
