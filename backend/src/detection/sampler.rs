use log::debug;

use super::error::DetectionError;
use super::scorers::ImageScorer;
use crate::video::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    /// Source time between sampled frames.
    pub every_secs: f64,
    pub max_samples: usize,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            every_secs: 0.5,
            max_samples: 20,
        }
    }
}

impl SamplingPolicy {
    /// Frame stride for a stream at `fps`; every frame when the rate is unknown.
    pub fn interval_for(&self, fps: Option<f64>) -> u64 {
        match fps {
            Some(fps) if fps.is_finite() && fps > 0.0 => ((fps * self.every_secs).round() as u64).max(1),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub index: u64,
    pub ai_probability: f64,
}

/// Scores every `interval`-th frame until `max_samples` or end of stream.
/// The first failure aborts the whole walk.
pub fn sample_frames(
    source: &mut dyn VideoSource,
    scorer: &dyn ImageScorer,
    policy: &SamplingPolicy,
) -> Result<Vec<FrameSample>, DetectionError> {
    let interval = policy.interval_for(source.frame_rate());
    debug!(
        "Sampling every {} frame(s) of {:?} at {:?} fps",
        interval,
        source.frame_count(),
        source.frame_rate()
    );

    let mut samples = Vec::with_capacity(policy.max_samples);
    let mut index = 0u64;
    while samples.len() < policy.max_samples {
        let Some(frame) = source.next_frame().map_err(DetectionError::Decode)? else {
            break;
        };
        if index % interval == 0 {
            let pair = scorer.score(&frame)?;
            samples.push(FrameSample {
                index,
                ai_probability: pair.ai,
            });
        }
        index += 1;
    }
    Ok(samples)
}

pub fn mean_ai_probability(samples: &[FrameSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().map(|s| s.ai_probability).sum();
    Some(total / samples.len() as f64)
}


#[cfg(test)]
mod tests {
    use super::synthetic::SyntheticVideo;
    use super::*;
    use crate::detection::heuristics::RandomPlaceholder;
    use crate::detection::labels::ProbabilityPair;
    use image::RgbImage;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    struct Fixed(f64);

    impl ImageScorer for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn score(&self, _image: &RgbImage) -> Result<ProbabilityPair, DetectionError> {
            Ok(ProbabilityPair::complement_of(self.0))
        }
    }

    #[test]
    fn interval_targets_half_second() {
        let policy = SamplingPolicy::default();

        assert_eq!(policy.interval_for(Some(10.0)), 5);
        assert_eq!(policy.interval_for(Some(30.0)), 15);
        assert_eq!(policy.interval_for(Some(25.0)), 13);
        assert_eq!(policy.interval_for(Some(1.0)), 1);
        assert_eq!(policy.interval_for(Some(0.0)), 1);
        assert_eq!(policy.interval_for(None), 1);
        assert_eq!(policy.interval_for(Some(f64::NAN)), 1);
    }

    #[test]
    fn caps_at_max_samples() {
        let mut video = SyntheticVideo::new(Some(10.0), 500, Arc::new(AtomicUsize::new(0)));
        let samples = sample_frames(&mut video, &Fixed(70.0), &SamplingPolicy::default()).unwrap();

        assert_eq!(samples.len(), 20);
        assert_eq!(samples[1].index, 5);
        assert_eq!(samples[19].index, 95);
    }

    #[test]
    fn stops_at_end_of_stream() {
        let mut video = SyntheticVideo::new(Some(10.0), 12, Arc::new(AtomicUsize::new(0)));
        let samples = sample_frames(&mut video, &Fixed(70.0), &SamplingPolicy::default()).unwrap();

        let indices: Vec<u64> = samples.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 5, 10]);
    }

    #[test]
    fn empty_stream_yields_no_samples() {
        let mut video = SyntheticVideo::new(Some(10.0), 0, Arc::new(AtomicUsize::new(0)));
        let samples = sample_frames(&mut video, &Fixed(70.0), &SamplingPolicy::default()).unwrap();

        assert!(samples.is_empty());
        assert_eq!(mean_ai_probability(&samples), None);
    }

    #[test]
    fn decode_failure_aborts() {
        let mut video = SyntheticVideo::new(None, 50, Arc::new(AtomicUsize::new(0)));
        video.fail_at = Some(3);
        let err = sample_frames(&mut video, &Fixed(70.0), &SamplingPolicy::default()).unwrap_err();

        assert!(matches!(err, DetectionError::Decode(_)));
    }

    #[test]
    fn seeded_placeholder_makes_sampling_reproducible() {
        let run = || {
            let mut video = SyntheticVideo::new(Some(10.0), 100, Arc::new(AtomicUsize::new(0)));
            let placeholder = RandomPlaceholder::new("p", 20.0, 80.0, Some(9));
            sample_frames(&mut video, &placeholder, &SamplingPolicy::default()).unwrap()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn mean_is_arithmetic() {
        let samples = [
            FrameSample { index: 0, ai_probability: 20.0 },
            FrameSample { index: 5, ai_probability: 80.0 },
            FrameSample { index: 10, ai_probability: 50.0 },
        ];

        assert_eq!(mean_ai_probability(&samples), Some(50.0));
    }
}
