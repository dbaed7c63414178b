use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::av::{Fraction, OutputBuffer, Packet, VideoDecoder, VideoFormat, VideoFrame};
use crate::config::{DecoderSettings, InputMode};
use crate::error::{DecodeError, Notice, Result};

use super::bridge::{new_shared, DirectRenderAllocator, OutputHost, Shared, SharedState};
use super::engine::{resolve_worker_threads, DecoderEngine, EngineFactory, EngineStatus};
use super::extradata::{ExtraData, FramingMode};
use super::format::{repack_plane, video_format_for, OutputState, SamplePlane};
use super::framer::LengthPrefixedNals;
use super::picture::{DecodedPicture, FrameTag};

/// Stream format announced by the upstream element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    ByteStream,
    Hvc1,
    Hev1,
}

impl FromStr for StreamFormat {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "byte-stream" => Ok(StreamFormat::ByteStream),
            "hvc1" => Ok(StreamFormat::Hvc1),
            "hev1" => Ok(StreamFormat::Hev1),
            other => Err(DecodeError::Config(format!("unknown stream format '{}'", other))),
        }
    }
}

/// Input stream description passed to [`H265Decoder::configure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputCaps {
    /// Out-of-band configuration: an hvcC record or Annex-B parameter sets.
    pub codec_data: Option<Bytes>,
    pub stream_format: Option<StreamFormat>,
    pub framerate: Option<Fraction>,
}

impl InputCaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec_data(mut self, codec_data: impl Into<Bytes>) -> Self {
        self.codec_data = Some(codec_data.into());
        self
    }

    pub fn with_stream_format(mut self, stream_format: StreamFormat) -> Self {
        self.stream_format = Some(stream_format);
        self
    }

    pub fn with_framerate(mut self, framerate: Fraction) -> Self {
        self.framerate = Some(framerate);
        self
    }
}

fn framing_for(mode: InputMode) -> FramingMode {
    match mode {
        InputMode::Packetized => FramingMode::default(),
        InputMode::Raw => FramingMode::Raw,
    }
}

fn check_push(status: EngineStatus, context: &'static str) -> Result<()> {
    match status {
        EngineStatus::Failed(msg) => {
            let err = DecodeError::engine(context, &msg);
            log::error!("{}", err);
            Err(err)
        }
        _ => Ok(()),
    }
}

/// Runs the engine over primed configuration data until it stops reporting
/// more work.
fn drain_codec_data(engine: &mut dyn DecoderEngine) -> Result<()> {
    loop {
        let step = engine.decode_step();
        match step.status {
            EngineStatus::Ok if step.more => continue,
            EngineStatus::Ok
            | EngineStatus::ImageBufferFull
            | EngineStatus::WaitingForInputData => return Ok(()),
            EngineStatus::Failed(msg) => {
                let err = DecodeError::engine("Failed to decode codec data", &msg);
                log::error!("{}", err);
                return Err(err);
            }
        }
    }
}

fn fill_planes(
    picture: &DecodedPicture,
    buffer: &mut OutputBuffer,
    format: VideoFormat,
) -> Result<()> {
    if buffer.info().format != format {
        return Err(DecodeError::Allocation(format!(
            "output buffer is {}, expected {}",
            buffer.info().format,
            format
        )));
    }
    for plane in 0..format.n_planes() {
        let (src, src_stride) = picture
            .plane(plane)
            .ok_or_else(|| DecodeError::Allocation(format!("plane {} has no storage", plane)))?;
        let dst_stride = buffer.info().stride(plane);
        repack_plane(
            SamplePlane::new(src, src_stride, picture.bits_per_pixel(plane)),
            SamplePlane::new(buffer.plane_mut(plane), dst_stride, format.bits()),
            picture.width(plane) as usize,
            picture.height(plane) as usize,
        )?;
    }
    Ok(())
}

/// Copies a picture decoded into engine memory into a fresh host buffer.
fn copy_out(
    shared: &mut Shared,
    picture: &DecodedPicture,
    frame_number: u32,
) -> Result<OutputBuffer> {
    let bits_per_pixel = picture.max_bits_per_pixel();
    let format = video_format_for(picture.chroma_format(), bits_per_pixel);
    if format == VideoFormat::Unknown {
        log::error!("Unsupported image format");
        return Err(DecodeError::UnsupportedFormat {
            chroma: picture.chroma_format(),
            bits_per_pixel,
        });
    }

    let Shared {
        host,
        tracker,
        negotiator,
        notices,
    } = shared;

    let notice = negotiator
        .image_available(&mut **host, format, picture.width(0), picture.height(0))
        .map_err(|e| {
            log::error!("Failed to notify about available image: {}", e);
            e
        })?;
    notices.extend(notice);

    let info = negotiator
        .state()
        .map(|state| state.info.clone())
        .ok_or_else(|| DecodeError::Negotiation("no output state".into()))?;
    let mut buffer = host.allocate_output_buffer(&info).map_err(|e| {
        log::error!("Failed to allocate output frame: {}", e);
        e
    })?;

    if let Err(e) = fill_planes(picture, &mut buffer, format) {
        host.release_output_buffer(buffer);
        return Err(e);
    }

    if let Some(frame) = tracker.get_mut(frame_number) {
        frame.decode_only = false;
    }
    Ok(buffer)
}

/// HEVC decoder front end.
///
/// Frames submitted access units for an engine, drives the engine, and turns
/// its pictures into [`VideoFrame`]s. Pictures are decoded straight into host
/// buffers when possible and copied out otherwise.
///
/// ```rust,no_run
/// use h265dec::av::Packet;
/// use h265dec::codec::h265::{EngineFactory, H265Decoder, InputCaps, PooledOutput};
/// use h265dec::config::DecoderSettings;
///
/// # fn run(factory: EngineFactory, hvcc: Vec<u8>, units: Vec<Vec<u8>>) -> h265dec::Result<()> {
/// let mut decoder = H265Decoder::new(factory, PooledOutput::new(), DecoderSettings::load()?);
/// decoder.start()?;
/// decoder.configure(InputCaps::new().with_codec_data(hvcc))?;
///
/// for (number, unit) in units.into_iter().enumerate() {
///     let packet = Packet::new(unit).with_frame_number(number as u32);
///     if let Some(frame) = decoder.submit(packet)? {
///         println!("frame {} pts {:?}", frame.system_frame_number, frame.pts);
///         decoder.release_frame(frame);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct H265Decoder {
    factory: EngineFactory,
    engine: Option<Box<dyn DecoderEngine>>,
    shared: SharedState,
    settings: DecoderSettings,
    framing: FramingMode,
    codec_data: Option<Bytes>,
    buffer_full: bool,
}

impl H265Decoder {
    pub fn new<H: OutputHost + 'static>(
        factory: EngineFactory,
        host: H,
        settings: DecoderSettings,
    ) -> Self {
        Self {
            factory,
            engine: None,
            shared: new_shared(Box::new(host)),
            framing: framing_for(settings.mode),
            settings,
            codec_data: None,
            buffer_full: false,
        }
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// Settings take effect on the next [`start`](Self::start), except the
    /// framerate override which applies from the next submitted unit.
    pub fn settings_mut(&mut self) -> &mut DecoderSettings {
        &mut self.settings
    }

    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    pub fn is_started(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether the engine has reported a full picture queue since the last
    /// flush.
    pub fn is_buffer_full(&self) -> bool {
        self.buffer_full
    }

    /// The output description last negotiated with the host.
    pub fn output_state(&self) -> Option<OutputState> {
        self.shared.lock().negotiator.state().cloned()
    }

    /// Takes all non-fatal notices raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.shared.lock().notices)
    }

    /// Number of submitted units that have not been emitted or discarded.
    pub fn pending_frames(&self) -> usize {
        self.shared.lock().tracker.pending()
    }

    /// Creates a fresh engine, replacing any previous one.
    pub fn start(&mut self) -> Result<()> {
        self.stop();

        let mut engine = (self.factory)()?;
        let threads = resolve_worker_threads(self.settings.max_threads);
        if threads > 1 {
            if let EngineStatus::Failed(msg) = engine.start_worker_threads(threads) {
                let err = DecodeError::engine("Failed to start worker threads", &msg);
                log::error!("{}", err);
                return Err(err);
            }
        }
        log::info!("Using {} with {} worker threads", engine.version(), threads);

        engine.set_image_allocator(Box::new(DirectRenderAllocator::new(Arc::clone(
            &self.shared,
        ))));
        engine.set_check_hash(self.settings.check_hash);

        self.framing = framing_for(self.settings.mode);
        self.engine = Some(engine);
        Ok(())
    }

    /// Drops the engine and all per-stream state.
    pub fn stop(&mut self) {
        // dropped before locking: the engine may release pictures on drop
        drop(self.engine.take());

        self.buffer_full = false;
        self.codec_data = None;
        self.framing = framing_for(self.settings.mode);

        let mut shared = self.shared.lock();
        shared.tracker.clear();
        shared.negotiator.reset();
    }

    pub fn shutdown(&mut self) {
        self.stop();
    }

    /// Applies a new input stream description.
    ///
    /// Codec data decides the framing and primes the engine with the
    /// parameter sets it carries. Without codec data the stream format hint,
    /// or failing that the configured [`InputMode`], decides the framing.
    pub fn configure(&mut self, caps: InputCaps) -> Result<()> {
        let engine = self.engine.as_deref_mut().ok_or(DecodeError::NotStarted)?;
        self.shared
            .lock()
            .negotiator
            .set_upstream_framerate(caps.framerate);

        let Some(codec_data) = caps.codec_data else {
            self.framing = match caps.stream_format {
                Some(StreamFormat::ByteStream) => {
                    log::debug!("Assuming raw byte-stream");
                    FramingMode::Raw
                }
                Some(StreamFormat::Hvc1) | Some(StreamFormat::Hev1) => FramingMode::default(),
                None => framing_for(self.settings.mode),
            };
            return Ok(());
        };

        let blob = Bytes::copy_from_slice(&codec_data);
        let extra = ExtraData::parse(&blob).map_err(|e| {
            log::error!("{}", e);
            e
        })?;
        self.framing = extra.framing();
        self.codec_data = Some(blob);

        match &extra {
            ExtraData::Hvcc(config) => {
                let version = config.header.version;
                if version != 0 {
                    log::warn!("Unsupported extra data version {}, decoding may fail", version);
                    self.shared
                        .lock()
                        .notices
                        .push(Notice::UnsupportedExtraDataVersion(version));
                }
                for nal in config.nal_units() {
                    check_push(engine.push_nal(nal, None, FrameTag::None), "Failed to push data")?;
                }
                log::info!(
                    "Assuming packetized data ({} bytes length)",
                    config.length_size()
                );
            }
            ExtraData::AnnexB(data) => {
                log::info!("Assuming non-packetized data");
                check_push(
                    engine.push_data(data, None, FrameTag::None),
                    "Failed to push codec data",
                )?;
            }
        }

        engine.push_end_of_unit();
        drain_codec_data(engine)
    }

    /// Feeds one access unit. An empty unit signals end of stream and drains
    /// pictures the engine holds back for reordering.
    ///
    /// Returns `Ok(None)` when the engine needs more input before the next
    /// picture is ready.
    pub fn submit(&mut self, packet: Packet) -> Result<Option<VideoFrame>> {
        let engine = self.engine.as_deref_mut().ok_or(DecodeError::NotStarted)?;
        let frame_number = packet.frame_number;
        let tag = FrameTag::FrameNumber(frame_number);

        {
            let mut shared = self.shared.lock();
            shared
                .negotiator
                .set_configured_framerate(self.settings.framerate());
            shared.tracker.register(frame_number, packet.pts);
            shared.tracker.set_current(frame_number);
        }

        if packet.is_end_of_stream() {
            check_push(engine.flush_data(), "Error while flushing data")?;
        } else {
            match self.framing {
                FramingMode::Packetized { length_size } => {
                    for nal in LengthPrefixedNals::new(&packet.data, length_size) {
                        let nal = nal.map_err(|e| {
                            log::error!("Overflow in input data, check data mode: {}", e);
                            e
                        })?;
                        check_push(
                            engine.push_nal(nal, packet.pts, tag),
                            "Error while pushing data",
                        )?;
                    }
                }
                FramingMode::Raw => {
                    check_push(
                        engine.push_data(&packet.data, packet.pts, tag),
                        "Error while pushing data",
                    )?;
                }
            }
        }

        self.decode_pending(frame_number)
    }

    fn decode_pending(&mut self, frame_number: u32) -> Result<Option<VideoFrame>> {
        let engine = self.engine.as_deref_mut().ok_or(DecodeError::NotStarted)?;

        let status = loop {
            let step = engine.decode_step();
            if !(step.more && step.status.is_ok()) {
                break step.status;
            }
        };

        match status {
            EngineStatus::Ok | EngineStatus::WaitingForInputData => {}
            EngineStatus::ImageBufferFull => {
                self.buffer_full = true;
                if engine.peek_next_picture().is_none() {
                    return Ok(None);
                }
            }
            EngineStatus::Failed(msg) => {
                let err = DecodeError::engine("Error while decoding", &msg);
                log::error!("{}", err);
                return Err(err);
            }
        }

        while let Some(warning) = engine.next_warning() {
            log::warn!("{}", warning);
            self.shared.lock().notices.push(Notice::EngineWarning(warning));
        }

        let mut picture = match engine.pop_next_picture() {
            Some(picture) => picture,
            None => return Ok(None),
        };
        let pts = picture.pts();

        let direct = picture
            .frame_ref_mut()
            .map(|frame_ref| (frame_ref.system_frame_number(), frame_ref.take_buffer()));
        if let Some((number, buffer)) = direct {
            engine.release_picture(picture);
            let buffer = buffer.ok_or_else(|| {
                DecodeError::Allocation(format!("buffer of frame {} was already emitted", number))
            })?;
            self.shared.lock().tracker.finish(number);
            return Ok(Some(VideoFrame {
                system_frame_number: number,
                pts,
                buffer,
                direct: true,
            }));
        }

        let result = copy_out(&mut self.shared.lock(), &picture, frame_number);
        engine.release_picture(picture);
        let buffer = result?;
        self.shared.lock().tracker.finish(frame_number);

        Ok(Some(VideoFrame {
            system_frame_number: frame_number,
            pts,
            buffer,
            direct: false,
        }))
    }

    /// Drops every queued picture and resets the engine. Raw streams are
    /// primed again with their stored codec data.
    pub fn flush(&mut self) -> Result<()> {
        let engine = self.engine.as_deref_mut().ok_or(DecodeError::NotStarted)?;

        while let Some(picture) = engine.pop_next_picture() {
            engine.release_picture(picture);
        }
        engine.reset();
        self.buffer_full = false;
        self.shared.lock().tracker.clear();

        if let (FramingMode::Raw, Some(codec_data)) = (self.framing, &self.codec_data) {
            check_push(
                engine.push_data(codec_data, None, FrameTag::None),
                "Failed to push codec data",
            )?;
            engine.push_end_of_unit();
            drain_codec_data(engine)?;
        }
        Ok(())
    }

    /// Hands the buffer of an emitted frame back to the host for reuse.
    pub fn release_frame(&mut self, frame: VideoFrame) {
        self.shared.lock().host.release_output_buffer(frame.buffer);
    }
}

#[async_trait]
impl VideoDecoder for H265Decoder {
    async fn decode(&mut self, packet: Packet) -> Result<Option<VideoFrame>> {
        self.submit(packet)
    }

    async fn flush(&mut self) -> Result<()> {
        H265Decoder::flush(self)
    }

    fn close(&mut self) {
        self.shutdown();
    }
}
