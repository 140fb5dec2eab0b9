use std::fs::File;
use std::io;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AudioError;
use crate::progress::CancelToken;

/// Stream properties read from the container header.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub duration_secs: f64,
}

struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: AudioInfo,
}

fn open(path: &Path) -> Result<OpenTrack, AudioError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let format = probed.format;
    let track = format.default_track().ok_or(AudioError::NoTrack)?;
    let params = &track.codec_params;

    let duration_secs = params
        .time_base
        .zip(params.n_frames)
        .map(|(tb, nf)| {
            let time = tb.calc_time(nf);
            time.seconds as f64 + time.frac
        })
        .or_else(|| {
            params
                .sample_rate
                .zip(params.n_frames)
                .map(|(sr, nf)| nf as f64 / sr.max(1) as f64)
        })
        .unwrap_or(0.0);

    let info = AudioInfo {
        sample_rate: params.sample_rate.unwrap_or(0),
        channels: params.channels.map(|c| c.count() as u32).unwrap_or(0),
        bit_depth: params.bits_per_sample.unwrap_or(0),
        duration_secs,
    };
    let track_id = track.id;
    let decoder = symphonia::default::get_codecs().make(params, &DecoderOptions::default())?;

    Ok(OpenTrack {
        format,
        decoder,
        track_id,
        info,
    })
}

pub fn probe(path: &Path) -> Result<AudioInfo, AudioError> {
    Ok(open(path)?.info)
}

/// Decode the whole stream, handing each block of interleaved samples to `sink`.
/// Returns early with `Ok(false)` once `sink` asks to stop.
fn for_each_block<F>(
    path: &Path,
    cancel: Option<&CancelToken>,
    mut sink: F,
) -> Result<AudioInfo, AudioError>
where
    F: FnMut(&[f32], usize) -> bool,
{
    let OpenTrack {
        mut format,
        mut decoder,
        track_id,
        mut info,
    } = open(path)?;

    loop {
        if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
            return Err(AudioError::Cancelled);
        }
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(SymError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                if info.channels == 0 {
                    info.channels = channels as u32;
                }
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                if !sink(buf.samples(), channels) {
                    break;
                }
            }
            Err(SymError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(info)
}

/// Decode to a mono signal by averaging channels.
pub fn decode_mono(path: &Path, cancel: Option<&CancelToken>) -> Result<(Vec<f32>, AudioInfo), AudioError> {
    let mut mono = Vec::new();
    let info = for_each_block(path, cancel, |samples, channels| {
        mono.extend(
            samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
        true
    })?;
    Ok((mono, info))
}

/// True if the file has two or more channels and every frame carries the same sample
/// on all of them. Stops decoding at the first differing frame.
pub fn channels_identical(path: &Path, cancel: Option<&CancelToken>) -> Result<bool, AudioError> {
    let mut identical = true;
    let mut multichannel = false;
    for_each_block(path, cancel, |samples, channels| {
        if channels < 2 {
            identical = false;
            return false;
        }
        multichannel = true;
        identical = samples.chunks(channels).all(|frame| {
            frame[1..]
                .iter()
                .all(|s| s.to_bits() == frame[0].to_bits())
        });
        identical
    })?;
    Ok(multichannel && identical)
}
