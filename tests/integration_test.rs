#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use h265dec::av::{Packet, VideoDecoder, VideoFormat};
    use h265dec::codec::h265::{
        ChromaFormat, DecodeStep, DecodedPicture, DecoderEngine, DefaultAllocator, EngineFactory,
        EngineStatus, EngineMessage, FrameTag, H265Decoder, ImageSpec, InputCaps, NALUnitType,
        PlaneAllocator, PooledOutput,
    };
    use h265dec::config::DecoderSettings;
    use h265dec::{DecodeError, Result};

    const WIDTH: u32 = 32;
    const HEIGHT: u32 = 16;

    /// Decodes every slice NAL unit into a flat grey 4:2:0 picture whose luma
    /// value is the slice's first payload byte.
    struct GreyEngine {
        allocator: Box<dyn PlaneAllocator>,
        input: VecDeque<(Vec<u8>, Option<i64>, FrameTag)>,
        output: VecDeque<DecodedPicture>,
    }

    impl GreyEngine {
        fn factory() -> EngineFactory {
            Box::new(|| {
                Ok(Box::new(GreyEngine {
                    allocator: Box::new(DefaultAllocator),
                    input: VecDeque::new(),
                    output: VecDeque::new(),
                }) as Box<dyn DecoderEngine>)
            })
        }

        fn decode(&mut self, nal: &[u8], pts: Option<i64>, tag: FrameTag) -> Result<()> {
            let spec = ImageSpec::new(ChromaFormat::Yuv420, WIDTH, HEIGHT, 16);
            let mut picture = DecodedPicture::new(spec.clone(), [8, 8, 8], pts, tag);
            self.allocator.acquire_plane_buffer(&spec, &mut picture)?;
            let luma = nal.get(2).copied().unwrap_or(0);
            for plane in 0..3 {
                let value = if plane == 0 { luma } else { 128 };
                let (data, _) = picture
                    .plane_mut(plane)
                    .ok_or_else(|| DecodeError::Allocation("missing plane".into()))?;
                data.fill(value);
            }
            self.output.push_back(picture);
            Ok(())
        }
    }

    impl DecoderEngine for GreyEngine {
        fn version(&self) -> &str {
            "grey 0.1"
        }

        fn set_image_allocator(&mut self, allocator: Box<dyn PlaneAllocator>) {
            self.allocator = allocator;
        }

        fn start_worker_threads(&mut self, _threads: usize) -> EngineStatus {
            EngineStatus::Ok
        }

        fn push_data(&mut self, data: &[u8], pts: Option<i64>, tag: FrameTag) -> EngineStatus {
            let starts: Vec<usize> = data
                .windows(3)
                .enumerate()
                .filter(|(_, w)| *w == [0x00, 0x00, 0x01])
                .map(|(i, _)| i + 3)
                .collect();
            for (n, &start) in starts.iter().enumerate() {
                let end = starts.get(n + 1).map_or(data.len(), |next| next - 3);
                let nal = &data[start..end];
                let len = nal.len() - nal.iter().rev().take_while(|&&b| b == 0).count();
                self.input.push_back((nal[..len].to_vec(), pts, tag));
            }
            EngineStatus::Ok
        }

        fn push_nal(&mut self, nal: &[u8], pts: Option<i64>, tag: FrameTag) -> EngineStatus {
            self.input.push_back((nal.to_vec(), pts, tag));
            EngineStatus::Ok
        }

        fn push_end_of_unit(&mut self) {}

        fn flush_data(&mut self) -> EngineStatus {
            EngineStatus::Ok
        }

        fn decode_step(&mut self) -> DecodeStep {
            let Some((nal, pts, tag)) = self.input.pop_front() else {
                return DecodeStep {
                    status: EngineStatus::WaitingForInputData,
                    more: false,
                };
            };
            if NALUnitType::of(&nal).map_or(false, |t| t.is_vcl()) {
                if let Err(e) = self.decode(&nal, pts, tag) {
                    return DecodeStep {
                        status: EngineStatus::Failed(EngineMessage::new(-1, e.to_string())),
                        more: false,
                    };
                }
            }
            DecodeStep {
                status: EngineStatus::Ok,
                more: !self.input.is_empty(),
            }
        }

        fn next_warning(&mut self) -> Option<EngineMessage> {
            None
        }

        fn peek_next_picture(&self) -> Option<&DecodedPicture> {
            self.output.front()
        }

        fn pop_next_picture(&mut self) -> Option<DecodedPicture> {
            self.output.pop_front()
        }

        fn release_picture(&mut self, picture: DecodedPicture) {
            self.allocator.release_plane_buffer(picture);
        }

        fn reset(&mut self) {
            self.input.clear();
            while let Some(picture) = self.output.pop_front() {
                self.allocator.release_plane_buffer(picture);
            }
        }
    }

    fn hvcc_record() -> Vec<u8> {
        let vps = [0x40, 0x01, 0x0C];
        let mut record = vec![
            0x00, 0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00, 0x5D, 0xF0,
            0x00, 0xFC, 0xFD, 0xF8, 0xF8, 0x00, 0x00, 0x0F, 0x01,
        ];
        record.extend_from_slice(&[0xA0, 0x00, 0x01, 0x00, vps.len() as u8]);
        record.extend_from_slice(&vps);
        record
    }

    fn slice(luma: u8) -> Vec<u8> {
        let nal = [0x26, 0x01, luma, 0x80];
        let mut unit = (nal.len() as u32).to_be_bytes().to_vec();
        unit.extend_from_slice(&nal);
        unit
    }

    #[tokio::test]
    async fn test_decode_hvcc_stream() {
        let mut decoder =
            H265Decoder::new(GreyEngine::factory(), PooledOutput::new(), DecoderSettings::new());
        decoder.start().unwrap();
        decoder
            .configure(InputCaps::new().with_codec_data(hvcc_record()))
            .unwrap();

        let decoder_ref: &mut dyn VideoDecoder = &mut decoder;
        for (number, luma) in [16u8, 80, 235].into_iter().enumerate() {
            let packet = Packet::new(slice(luma))
                .with_frame_number(number as u32)
                .with_pts(number as i64 * 3000);
            let frame = decoder_ref.decode(packet).await.unwrap().expect("frame");

            assert!(frame.direct);
            assert_eq!(frame.system_frame_number, number as u32);
            assert_eq!(frame.pts, Some(number as i64 * 3000));
            assert_eq!(frame.info().format, VideoFormat::I420);
            assert_eq!((frame.width(), frame.height()), (WIDTH, HEIGHT));
            assert!(frame.buffer.plane(0)[..WIDTH as usize].iter().all(|&v| v == luma));
            assert!(frame.buffer.plane(1)[..(WIDTH / 2) as usize]
                .iter()
                .all(|&v| v == 128));
        }

        decoder_ref.flush().await.unwrap();
        decoder_ref.close();
        assert!(!decoder.is_started());
        assert_eq!(decoder.pending_frames(), 0);
    }

    #[test]
    fn test_decode_annex_b_stream() {
        let mut decoder =
            H265Decoder::new(GreyEngine::factory(), PooledOutput::new(), DecoderSettings::new());
        decoder.start().unwrap();
        let codec_data = vec![0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x0C];
        decoder
            .configure(InputCaps::new().with_codec_data(codec_data))
            .unwrap();

        let unit = vec![0x00, 0x00, 0x01, 0x26, 0x01, 0x40, 0x80];
        let frame = tokio_test::block_on(decoder.decode(Packet::new(unit)))
            .unwrap()
            .expect("frame");

        assert!(frame.buffer.plane(0)[..WIDTH as usize].iter().all(|&v| v == 0x40));
        decoder.release_frame(frame);
    }

    #[test]
    fn test_submit_before_start_fails() {
        let mut decoder =
            H265Decoder::new(GreyEngine::factory(), PooledOutput::new(), DecoderSettings::new());
        let result = decoder.submit(Packet::new(slice(16)));
        assert!(matches!(result, Err(DecodeError::NotStarted)));
    }
}
