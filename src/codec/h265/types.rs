// h265dec/src/codec/h265/types.rs

/// `nal_unit_type` values from the two-byte H.265 NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NALUnitType {
    TrailN,
    TrailR,
    TsaN,
    TsaR,
    StsaN,
    StsaR,
    RadlN,
    RadlR,
    RaslN,
    RaslR,
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    IdrWRadl,
    IdrNLp,
    CraNut,
    Vps,
    Sps,
    Pps,
    Aud,
    Eos,
    Eob,
    Fd,
    PrefixSei,
    SuffixSei,
    /// Reserved VCL (10..=15, 22..=31) and non-VCL (41..=47) types.
    Reserved(u8),
    /// 48..=63.
    Unspecified(u8),
}

impl NALUnitType {
    pub fn from_u8(value: u8) -> Self {
        match value & 0x3F {
            0 => NALUnitType::TrailN,
            1 => NALUnitType::TrailR,
            2 => NALUnitType::TsaN,
            3 => NALUnitType::TsaR,
            4 => NALUnitType::StsaN,
            5 => NALUnitType::StsaR,
            6 => NALUnitType::RadlN,
            7 => NALUnitType::RadlR,
            8 => NALUnitType::RaslN,
            9 => NALUnitType::RaslR,
            16 => NALUnitType::BlaWLp,
            17 => NALUnitType::BlaWRadl,
            18 => NALUnitType::BlaNLp,
            19 => NALUnitType::IdrWRadl,
            20 => NALUnitType::IdrNLp,
            21 => NALUnitType::CraNut,
            32 => NALUnitType::Vps,
            33 => NALUnitType::Sps,
            34 => NALUnitType::Pps,
            35 => NALUnitType::Aud,
            36 => NALUnitType::Eos,
            37 => NALUnitType::Eob,
            38 => NALUnitType::Fd,
            39 => NALUnitType::PrefixSei,
            40 => NALUnitType::SuffixSei,
            v @ 48..=63 => NALUnitType::Unspecified(v),
            v => NALUnitType::Reserved(v),
        }
    }

    /// Extracts the type from the first byte of a NAL unit header.
    pub fn from_header(first_byte: u8) -> Self {
        Self::from_u8(first_byte >> 1)
    }

    /// Type of the NAL unit starting at `nal`, `None` if it is too short to
    /// carry a header.
    pub fn of(nal: &[u8]) -> Option<Self> {
        if nal.len() < 2 {
            return None;
        }
        Some(Self::from_header(nal[0]))
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            NALUnitType::TrailN => 0,
            NALUnitType::TrailR => 1,
            NALUnitType::TsaN => 2,
            NALUnitType::TsaR => 3,
            NALUnitType::StsaN => 4,
            NALUnitType::StsaR => 5,
            NALUnitType::RadlN => 6,
            NALUnitType::RadlR => 7,
            NALUnitType::RaslN => 8,
            NALUnitType::RaslR => 9,
            NALUnitType::BlaWLp => 16,
            NALUnitType::BlaWRadl => 17,
            NALUnitType::BlaNLp => 18,
            NALUnitType::IdrWRadl => 19,
            NALUnitType::IdrNLp => 20,
            NALUnitType::CraNut => 21,
            NALUnitType::Vps => 32,
            NALUnitType::Sps => 33,
            NALUnitType::Pps => 34,
            NALUnitType::Aud => 35,
            NALUnitType::Eos => 36,
            NALUnitType::Eob => 37,
            NALUnitType::Fd => 38,
            NALUnitType::PrefixSei => 39,
            NALUnitType::SuffixSei => 40,
            NALUnitType::Reserved(v) | NALUnitType::Unspecified(v) => *v,
        }
    }

    /// Slice segment data (types 0..=31).
    pub fn is_vcl(&self) -> bool {
        self.as_u8() < 32
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NALUnitType::Vps | NALUnitType::Sps | NALUnitType::Pps)
    }
}
