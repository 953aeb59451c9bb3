//! Remap Integration Tests
//!
//! Properties of the channel remap matrix on decoded audio.

use approx::assert_relative_eq;
use test_case::test_case;

use upmix::engine::AudioBuffer;
use upmix::remap::RemapEntry;
use upmix::{RemapMatrix, UpmixError};

/// N channels of distinct ramps
fn wave_field(channels: usize, frames: usize) -> AudioBuffer {
    let samples = (0..channels)
        .map(|ch| {
            (0..frames)
                .map(|t| ((ch + 1) as f32 * 0.01) * (t as f32 / frames as f32 - 0.5))
                .collect()
        })
        .collect();
    AudioBuffer::from_channels(samples, 48000).unwrap()
}

#[test_case("0 0 1v1 2v1 3v1 4v1 5v1 6v1 7v1 8v1 0 0 9v1 10v1 11v1 12v1 13v1 14v1 15v1 16v1" ; "reference rig")]
#[test_case("1-16" ; "full mix")]
#[test_case("16 15 14 13 12 11 10 9 8 7 6 5 4 3 2 1" ; "reversed")]
#[test_case("1v0.5,2v-0.25 0 3p-6" ; "mixed gains")]
fn test_silent_in_silent_out(layout: &str) {
    let matrix = RemapMatrix::from_remix(16, layout).unwrap();
    let silence = AudioBuffer::new(16, 256, 48000);

    let output = matrix.apply(&silence).unwrap();

    assert_eq!(output.num_channels(), matrix.outputs());
    assert!(output.is_silent());
}

#[test]
fn test_permutation_round_trip_is_identity() {
    let order = [3, 0, 7, 1, 6, 2, 5, 4];
    let matrix = RemapMatrix::permutation(&order).unwrap();
    let input = wave_field(8, 128);

    let restored = matrix
        .inverse()
        .unwrap()
        .apply(&matrix.apply(&input).unwrap())
        .unwrap();

    assert_eq!(restored, input);
}

#[test]
fn test_unity_remap_preserves_samples() {
    let matrix = RemapMatrix::from_remix(4, "0 2 0 4 1").unwrap();
    let input = wave_field(4, 64);

    let output = matrix.apply(&input).unwrap();

    assert!(output.is_channel_silent(0));
    assert!(output.is_channel_silent(2));
    assert_eq!(output.channel(1), input.channel(1));
    assert_eq!(output.channel(3), input.channel(3));
    assert_eq!(output.channel(4), input.channel(0));
}

#[test]
fn test_summed_sources_with_gain() {
    let matrix = RemapMatrix::from_remix(2, "1v0.5,2v0.25").unwrap();
    let input = wave_field(2, 32);

    let output = matrix.apply(&input).unwrap();

    for t in 0..32 {
        assert_relative_eq!(
            output.channel(0)[t],
            0.5 * input.channel(0)[t] + 0.25 * input.channel(1)[t],
            epsilon = 1e-7
        );
    }
}

#[test_case(vec![RemapEntry::unity(16, 0)] ; "source out of range")]
#[test_case(vec![RemapEntry::unity(0, 20)] ; "destination out of range")]
#[test_case(vec![RemapEntry::unity(3, 5), RemapEntry::new(3, 5, 0.5)] ; "duplicate pair")]
#[test_case(vec![RemapEntry::new(0, 0, f32::NAN)] ; "non-finite gain")]
fn test_invalid_matrix_rejected_at_construction(entries: Vec<RemapEntry>) {
    let result = RemapMatrix::new(16, 20, entries);
    assert!(matches!(result, Err(UpmixError::InvalidRemap { .. })));
}

#[test]
fn test_wrong_input_width_is_rejected() {
    let matrix = RemapMatrix::from_remix(16, "1 2").unwrap();
    let err = matrix.apply(&wave_field(12, 8)).unwrap_err();
    assert!(matches!(
        err,
        UpmixError::ChannelMismatch {
            expected: 16,
            actual: 12
        }
    ));
}

#[test]
fn test_rendered_layout_parses_back_to_same_matrix() {
    let matrix = RemapMatrix::from_remix(16, "0 0 1-4 5v0.5,6v0.5 0 9").unwrap();
    let rendered = matrix.to_string();
    assert_eq!(RemapMatrix::from_remix(16, &rendered).unwrap(), matrix);
}
