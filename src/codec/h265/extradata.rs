//! Out-of-band codec configuration ("codec_data") handling.
//!
//! Containers such as MP4 and Matroska carry an `HEVCDecoderConfigurationRecord`
//! (hvcC) in front of length-prefixed access units. Other sources hand over the
//! parameter sets as a plain Annex-B byte stream instead. The two are told
//! apart by their first three bytes.

use bytes::Bytes;

use super::types::NALUnitType;
use crate::error::{DecodeError, Result};
use crate::utils::BitReader;

/// Size of the fixed part of an hvcC record, up to and including `numOfArrays`.
pub const HVCC_HEADER_SIZE: usize = 23;

/// How NAL units are delimited inside access units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// Every NAL unit is preceded by a big-endian length of `length_size` bytes.
    Packetized { length_size: u8 },
    /// Annex-B byte stream with start codes.
    Raw,
}

impl FramingMode {
    pub fn packetized(length_size: u8) -> Result<Self> {
        if !(1..=4).contains(&length_size) {
            return Err(DecodeError::Format(format!(
                "invalid NAL length size {}",
                length_size
            )));
        }
        Ok(FramingMode::Packetized { length_size })
    }
}

impl Default for FramingMode {
    fn default() -> Self {
        FramingMode::Packetized { length_size: 4 }
    }
}

/// Fixed header fields of an hvcC record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HvcConfigHeader {
    pub version: u8,
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub profile_compatibility_flags: u32,
    pub constraint_indicator_flags: u64,
    pub level_idc: u8,
    pub min_spatial_segmentation_idc: u16,
    pub parallelism_type: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub length_size: u8,
    pub num_arrays: u8,
}

impl HvcConfigHeader {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HVCC_HEADER_SIZE {
            return Err(DecodeError::Format(format!(
                "Buffer underrun in extra header ({} > {})",
                HVCC_HEADER_SIZE,
                data.len()
            )));
        }

        let mut reader = BitReader::new(&data[..HVCC_HEADER_SIZE]);
        let mut header = HvcConfigHeader {
            version: reader.read_bits(8)? as u8,
            profile_space: reader.read_bits(2)? as u8,
            tier_flag: reader.read_bit()?,
            profile_idc: reader.read_bits(5)? as u8,
            profile_compatibility_flags: reader.read_bits(32)?,
            constraint_indicator_flags: reader.read_bits_u64(48)?,
            level_idc: reader.read_bits(8)? as u8,
            ..Default::default()
        };

        reader.skip_bits(4)?;
        header.min_spatial_segmentation_idc = reader.read_bits(12)? as u16;
        reader.skip_bits(6)?;
        header.parallelism_type = reader.read_bits(2)? as u8;
        reader.skip_bits(6)?;
        header.chroma_format_idc = reader.read_bits(2)? as u8;
        reader.skip_bits(5)?;
        header.bit_depth_luma = reader.read_bits(3)? as u8 + 8;
        reader.skip_bits(5)?;
        header.bit_depth_chroma = reader.read_bits(3)? as u8 + 8;
        header.avg_frame_rate = reader.read_bits(16)? as u16;
        header.constant_frame_rate = reader.read_bits(2)? as u8;
        header.num_temporal_layers = reader.read_bits(3)? as u8;
        header.temporal_id_nested = reader.read_bit()?;
        header.length_size = reader.read_bits(2)? as u8 + 1;
        header.num_arrays = reader.read_bits(8)? as u8;

        Ok(header)
    }
}

/// One `array` entry of an hvcC record: NAL units of a single type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSetArray {
    pub completeness: bool,
    pub nal_type: NALUnitType,
    pub nal_units: Vec<Bytes>,
}

/// A parsed hvcC record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HvcConfig {
    pub header: HvcConfigHeader,
    pub arrays: Vec<ParameterSetArray>,
}

impl HvcConfig {
    /// Parses an hvcC record. NAL units are returned as slices of `data`.
    ///
    /// Every read is bounds checked against the record length; any overrun
    /// rejects the whole record.
    pub fn parse(data: &Bytes) -> Result<Self> {
        let header = HvcConfigHeader::parse(data)?;
        let size = data.len();
        let mut arrays = Vec::with_capacity(header.num_arrays as usize);
        let mut pos = HVCC_HEADER_SIZE;

        for _ in 0..header.num_arrays {
            if pos + 3 > size {
                return Err(DecodeError::Format(format!(
                    "Buffer underrun in extra header ({} >= {})",
                    pos + 3,
                    size
                )));
            }
            let completeness = data[pos] & 0x80 != 0;
            let nal_type = NALUnitType::from_u8(data[pos] & 0x3F);
            let nal_count = u16::from_be_bytes([data[pos + 1], data[pos + 2]]) as usize;
            pos += 3;

            let mut nal_units = Vec::with_capacity(nal_count);
            for _ in 0..nal_count {
                if pos + 2 > size {
                    return Err(DecodeError::Format(format!(
                        "Buffer underrun in extra nal header ({} >= {})",
                        pos + 2,
                        size
                    )));
                }
                let nal_size = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                if pos + 2 + nal_size > size {
                    return Err(DecodeError::Format(format!(
                        "Buffer underrun in extra nal ({} >= {})",
                        pos + 2 + nal_size,
                        size
                    )));
                }
                nal_units.push(data.slice(pos + 2..pos + 2 + nal_size));
                pos += 2 + nal_size;
            }

            if nal_type.is_parameter_set() {
                log::debug!(
                    "hvcC array {:?} (complete: {}): {} NAL units",
                    nal_type,
                    completeness,
                    nal_units.len()
                );
            } else {
                log::debug!(
                    "hvcC array of non parameter set type {:?}: {} NAL units",
                    nal_type,
                    nal_units.len()
                );
            }
            arrays.push(ParameterSetArray {
                completeness,
                nal_type,
                nal_units,
            });
        }

        Ok(HvcConfig { header, arrays })
    }

    pub fn length_size(&self) -> u8 {
        self.header.length_size
    }

    /// All NAL units in record order: array by array, unit by unit.
    pub fn nal_units(&self) -> impl Iterator<Item = &Bytes> {
        self.arrays.iter().flat_map(|array| array.nal_units.iter())
    }
}

/// Classified codec configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraData {
    Hvcc(HvcConfig),
    /// Annex-B parameter sets, kept verbatim.
    AnnexB(Bytes),
}

impl ExtraData {
    pub fn parse(blob: &Bytes) -> Result<Self> {
        if is_hvcc(blob) {
            Ok(ExtraData::Hvcc(HvcConfig::parse(blob)?))
        } else {
            Ok(ExtraData::AnnexB(blob.clone()))
        }
    }

    /// Framing of the access units that follow this configuration.
    pub fn framing(&self) -> FramingMode {
        match self {
            ExtraData::Hvcc(config) => FramingMode::Packetized {
                length_size: config.length_size(),
            },
            ExtraData::AnnexB(_) => FramingMode::Raw,
        }
    }
}

/// Whether `data` looks like an hvcC record rather than Annex-B data.
///
/// Annex-B data starts with `00 00 00` or `00 00 01`; anything longer than
/// three bytes that does not is taken to be hvcC.
pub fn is_hvcc(data: &[u8]) -> bool {
    data.len() > 3 && (data[0] != 0 || data[1] != 0 || data[2] > 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hvcc_header(version: u8, length_size: u8, num_arrays: u8) -> Vec<u8> {
        vec![
            version,
            0x01, // profile_space 0, tier 0, Main profile
            0x60, 0x00, 0x00, 0x00, // compatibility flags
            0x90, 0x00, 0x00, 0x00, 0x00, 0x00, // constraint flags
            0x5D, // level 3.1
            0xF0, 0x00, // min_spatial_segmentation_idc
            0xFC, // parallelismType
            0xFD, // chroma_format_idc = 1
            0xFA, // bit_depth_luma_minus8 = 2
            0xFA, // bit_depth_chroma_minus8 = 2
            0x00, 0x00, // avgFrameRate
            0x0C | (length_size - 1), // 1 temporal layer, nested
            num_arrays,
        ]
    }

    fn push_array(out: &mut Vec<u8>, nal_type: u8, nals: &[&[u8]]) {
        out.push(0x80 | nal_type);
        out.extend_from_slice(&(nals.len() as u16).to_be_bytes());
        for nal in nals {
            out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            out.extend_from_slice(nal);
        }
    }

    #[test]
    fn test_parse_header_fields() {
        let blob = Bytes::from(hvcc_header(0, 4, 0));
        let config = HvcConfig::parse(&blob).unwrap();
        assert_eq!(config.header.version, 0);
        assert_eq!(config.header.profile_idc, 1);
        assert_eq!(config.header.profile_compatibility_flags, 0x6000_0000);
        assert_eq!(config.header.constraint_indicator_flags, 0x9000_0000_0000);
        assert_eq!(config.header.level_idc, 93);
        assert_eq!(config.header.chroma_format_idc, 1);
        assert_eq!(config.header.bit_depth_luma, 10);
        assert_eq!(config.header.bit_depth_chroma, 10);
        assert_eq!(config.header.num_temporal_layers, 1);
        assert!(config.header.temporal_id_nested);
        assert_eq!(config.length_size(), 4);
        assert!(config.arrays.is_empty());
    }

    #[test]
    fn test_parse_arrays_in_order() {
        let mut data = hvcc_header(0, 2, 2);
        push_array(&mut data, 32, &[&[0x40, 0x01, 0xAA]]);
        push_array(&mut data, 33, &[&[0x42, 0x01, 0xBB], &[0x42, 0x01, 0xCC, 0xDD]]);
        let blob = Bytes::from(data);

        let extra = ExtraData::parse(&blob).unwrap();
        assert_eq!(extra.framing(), FramingMode::Packetized { length_size: 2 });

        let ExtraData::Hvcc(config) = extra else {
            panic!("expected hvcC");
        };
        assert_eq!(config.arrays[0].nal_type, NALUnitType::Vps);
        assert_eq!(config.arrays[1].nal_type, NALUnitType::Sps);
        assert!(config.arrays[1].completeness);

        let nals: Vec<&[u8]> = config.nal_units().map(|nal| nal.as_ref()).collect();
        assert_eq!(
            nals,
            vec![
                &[0x40, 0x01, 0xAA][..],
                &[0x42, 0x01, 0xBB][..],
                &[0x42, 0x01, 0xCC, 0xDD][..],
            ]
        );
    }

    #[test]
    fn test_underruns_are_format_errors() {
        // header too short
        let blob = Bytes::from(hvcc_header(0, 4, 1)[..20].to_vec());
        assert!(matches!(HvcConfig::parse(&blob), Err(DecodeError::Format(_))));

        // array header missing
        let blob = Bytes::from(hvcc_header(0, 4, 1));
        assert!(matches!(HvcConfig::parse(&blob), Err(DecodeError::Format(_))));

        // NAL length field missing
        let mut data = hvcc_header(0, 4, 1);
        data.extend_from_slice(&[0xA0, 0x00, 0x01, 0x00]);
        assert!(matches!(
            HvcConfig::parse(&Bytes::from(data)),
            Err(DecodeError::Format(_))
        ));

        // NAL payload shorter than declared
        let mut data = hvcc_header(0, 4, 1);
        data.extend_from_slice(&[0xA0, 0x00, 0x01, 0x00, 0x05, 0x40, 0x01]);
        assert!(matches!(
            HvcConfig::parse(&Bytes::from(data)),
            Err(DecodeError::Format(_))
        ));
    }

    #[test]
    fn test_annex_b_detection() {
        assert!(!is_hvcc(&[0x00, 0x00, 0x00, 0x01, 0x40]));
        assert!(!is_hvcc(&[0x00, 0x00, 0x01, 0x40]));
        assert!(!is_hvcc(&[0x01, 0x02, 0x03]));
        assert!(is_hvcc(&[0x01, 0x01, 0x60, 0x00]));
        assert!(is_hvcc(&[0x00, 0x00, 0x02, 0x00]));

        let blob = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x0C]);
        let extra = ExtraData::parse(&blob).unwrap();
        assert_eq!(extra.framing(), FramingMode::Raw);
        assert_eq!(extra, ExtraData::AnnexB(blob));
    }

    #[test]
    fn test_length_size_validation() {
        assert!(FramingMode::packetized(0).is_err());
        assert!(FramingMode::packetized(5).is_err());
        assert_eq!(
            FramingMode::packetized(3).unwrap(),
            FramingMode::Packetized { length_size: 3 }
        );
        assert_eq!(FramingMode::default(), FramingMode::Packetized { length_size: 4 });
    }
}
