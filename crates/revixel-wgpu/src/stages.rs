//! The fixed enhancement stage sequence
//!
//! Four stages, executed in order: highlight clamping, CNN-style detail
//! restoration, CNN-style 2x upscaling, and a conditional resample down to
//! the declared output resolution. The topology is fixed; which passes run
//! is decided per pipeline construction by the conditions below.

use crate::scale::ScaleFactor;
use crate::stage::{PassTemplate, StageOutput, StageTemplate};

/// Gate for every upscaler pass: only worth running while the target is
/// meaningfully above the current resolution
const UPSCALE_GATE: &str = "OUTPUT.w MAIN.w / 1.2 > OUTPUT.h MAIN.h / 1.2 > *";

/// Gate for the pre-downscale correction: only when the target sits strictly
/// between 1.2x and 2x native
const DOWNSCALE_GATE: &str =
    "OUTPUT.w NATIVE.w / 2.0 < OUTPUT.h NATIVE.h / 2.0 < * OUTPUT.w NATIVE.w / 1.2 > OUTPUT.h NATIVE.h / 1.2 > * *";

const CLAMP_PASSES: &[PassTemplate] = &[
    PassTemplate {
        label: "stats x",
        fragment: include_str!("../shaders/clamp_stats_x.wgsl"),
        when: None,
        dependencies: &[],
    },
    PassTemplate {
        label: "stats y",
        fragment: include_str!("../shaders/clamp_stats_y.wgsl"),
        when: None,
        dependencies: &[0],
    },
    PassTemplate {
        label: "apply",
        fragment: include_str!("../shaders/clamp_apply.wgsl"),
        when: None,
        dependencies: &[1],
    },
];

const RESTORE_PASSES: &[PassTemplate] = &[
    PassTemplate {
        label: "conv0",
        fragment: include_str!("../shaders/restore_conv0.wgsl"),
        when: None,
        dependencies: &[],
    },
    PassTemplate {
        label: "conv1",
        fragment: include_str!("../shaders/restore_conv1.wgsl"),
        when: None,
        dependencies: &[0],
    },
    PassTemplate {
        label: "conv2",
        fragment: include_str!("../shaders/restore_conv2.wgsl"),
        when: None,
        dependencies: &[0, 1],
    },
    PassTemplate {
        label: "conv3",
        fragment: include_str!("../shaders/restore_conv3.wgsl"),
        when: None,
        dependencies: &[0, 1, 2],
    },
    PassTemplate {
        label: "combine",
        fragment: include_str!("../shaders/restore_combine.wgsl"),
        when: None,
        dependencies: &[0, 1, 2, 3],
    },
];

const UPSCALE_PASSES: &[PassTemplate] = &[
    PassTemplate {
        label: "conv0",
        fragment: include_str!("../shaders/upscale_conv0.wgsl"),
        when: Some(UPSCALE_GATE),
        dependencies: &[],
    },
    PassTemplate {
        label: "conv1",
        fragment: include_str!("../shaders/upscale_conv1.wgsl"),
        when: Some(UPSCALE_GATE),
        dependencies: &[0],
    },
    PassTemplate {
        label: "conv2",
        fragment: include_str!("../shaders/upscale_conv2.wgsl"),
        when: Some(UPSCALE_GATE),
        dependencies: &[0, 1],
    },
    PassTemplate {
        label: "conv3",
        fragment: include_str!("../shaders/upscale_conv3.wgsl"),
        when: Some(UPSCALE_GATE),
        dependencies: &[0, 1, 2],
    },
    PassTemplate {
        label: "features",
        fragment: include_str!("../shaders/upscale_features.wgsl"),
        when: Some(UPSCALE_GATE),
        dependencies: &[0, 1, 2, 3],
    },
    PassTemplate {
        label: "shuffle",
        fragment: include_str!("../shaders/upscale_shuffle.wgsl"),
        when: Some(UPSCALE_GATE),
        dependencies: &[0, 1, 2, 3, 4],
    },
];

const DOWNSCALE_PASSES: &[PassTemplate] = &[PassTemplate {
    label: "resample",
    fragment: include_str!("../shaders/downscale_resample.wgsl"),
    when: Some(DOWNSCALE_GATE),
    dependencies: &[],
}];

/// The standard stage sequence, in execution order
pub const STANDARD_STAGES: [StageTemplate; 4] = [
    StageTemplate {
        label: "clamp highlights",
        passes: CLAMP_PASSES,
        output: StageOutput::Scaled(ScaleFactor::UNITY),
    },
    StageTemplate {
        label: "restore cnn",
        passes: RESTORE_PASSES,
        output: StageOutput::Scaled(ScaleFactor::UNITY),
    },
    StageTemplate {
        label: "upscale cnn x2",
        passes: UPSCALE_PASSES,
        output: StageOutput::Scaled(ScaleFactor::new(2, 1)),
    },
    StageTemplate {
        label: "auto downscale pre",
        passes: DOWNSCALE_PASSES,
        output: StageOutput::Declared,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::Resolution;
    use crate::stage::plan_pipeline;
    use crate::surface::SurfaceFormat;

    fn plan(native: (u32, u32), target: (u32, u32)) -> crate::stage::PipelinePlan {
        plan_pipeline(
            &STANDARD_STAGES,
            Resolution::new(native.0, native.1).unwrap(),
            Resolution::new(target.0, target.1).unwrap(),
            SurfaceFormat::Rgba8Unorm,
        )
        .unwrap()
    }

    #[test]
    fn exact_2x_skips_the_downscale_correction() {
        let p = plan((960, 540), (1920, 1080));

        assert!(!p.stages[0].is_bypassed());
        assert!(!p.stages[1].is_bypassed());
        assert!(!p.stages[2].is_bypassed());
        assert!(p.stages[3].is_bypassed());
        assert_eq!((p.output_resolution.width, p.output_resolution.height), (1920, 1080));
    }

    #[test]
    fn intermediate_ratio_runs_the_downscale_correction() {
        let p = plan((1000, 1000), (1500, 1500));

        assert!(!p.stages[2].is_bypassed());
        assert!(!p.stages[3].is_bypassed());
        // Upscaled to 2x, then resampled to the declared target.
        assert_eq!((p.output_resolution.width, p.output_resolution.height), (1500, 1500));
    }

    #[test]
    fn native_target_bypasses_upscale_and_downscale() {
        let p = plan((800, 600), (800, 600));

        assert!(p.stages[2].is_bypassed());
        assert!(p.stages[3].is_bypassed());
        // Clamp and restore still run, so the output is the restore surface.
        assert_eq!(p.output, p.stages[1].output());
        assert_eq!((p.output_resolution.width, p.output_resolution.height), (800, 600));
    }

    #[test]
    fn standard_templates_validate_at_many_ratios() {
        for (native, target) in [((64, 64), (64, 64)), ((64, 64), (80, 80)), ((64, 64), (128, 128)), ((64, 64), (96, 96)), ((100, 50), (200, 100))] {
            let p = plan(native, target);
            assert!(!p.stages[0].is_bypassed());
            assert!(!p.stages[1].is_bypassed());
        }
    }
}
