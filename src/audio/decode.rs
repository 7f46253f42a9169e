use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::track::{AudioTrack, PcmSource};
use crate::error::{Result, StemvizError};

/// Decodes a stem into interleaved 16-bit PCM, keeping every channel.
///
/// Channel count is not enforced here; the extractor rejects non-stereo
/// tracks so the error carries what was actually found in the file.
pub fn decode_track(path: &Path) -> Result<AudioTrack> {
    let name = path.display().to_string();
    let decode_err = |reason: String| StemvizError::Decode {
        track: name.clone(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StemvizError::SourceNotFound(path.to_path_buf())
        } else {
            StemvizError::io(path, e)
        }
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err(format!("failed to probe format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no audio tracks found".into()))?;

    let track_id = track.id;
    let mut channels = track.codec_params.channels.map(|c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_err("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_err(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(decode_err(e.to_string())),
        };

        let spec = *decoded.spec();
        channels.get_or_insert(spec.channels.count());

        let mut sample_buf = SampleBuffer::<i16>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let channels = channels.unwrap_or(1) as u16;
    let track = AudioTrack::new(name, samples, channels, sample_rate)?;
    log::debug!(
        "Decoded {}: {:.1}s, {} ch, {}Hz",
        track.name(),
        track.duration_s(),
        track.channels(),
        track.sample_rate()
    );

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::PcmSource;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::tempdir;

    #[test]
    fn decodes_stereo_wav_as_interleaved_i16() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stem.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for i in 0..1000i16 {
            writer.write_sample(i).unwrap();
            writer.write_sample(-i).unwrap();
        }
        writer.finalize().unwrap();

        let track = decode_track(&path).unwrap();
        assert_eq!(track.channels(), 2);
        assert_eq!(track.sample_rate(), 22_050);
        assert_eq!(track.len(), 2000);
        assert_eq!(track.sample(2), Some(1));
        assert_eq!(track.sample(3), Some(-1));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = tempdir().unwrap();
        let err = decode_track(&dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, StemvizError::SourceNotFound(_)));
    }
}
