//! Draw-operation sequencing
//!
//! Flattens a planned pipeline into the linear list of draw operations the
//! GPU executor records. This is purely a sequencing concern: stages in
//! pipeline order, enabled passes in declared order, terminal pass last.
//! Later passes sample surfaces written by earlier ones within the same
//! command sequence, so no operation is ever reordered relative to its
//! declaration.

use crate::stage::{PipelinePlan, StagePlan};
use crate::surface::SurfaceId;

/// One recorded draw: render `pass` of `stage` into `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOp {
    /// Stage position in the pipeline
    pub stage: usize,
    /// Pass position within the stage
    pub pass: usize,
    /// Combined label for GPU debugging
    pub label: String,
    /// WGSL fragment shader source for this pass
    pub fragment: &'static str,
    /// Render target surface
    pub target: SurfaceId,
    /// Stage input surface (binding 0)
    pub source: SurfaceId,
    /// Dependency surfaces in binding order (bindings 2..)
    pub dependencies: Vec<SurfaceId>,
}

/// Sequences all enabled passes of a planned pipeline
///
/// Bypassed stages contribute no operations; their input simply flows to the
/// next stage through the surface alias established during planning.
pub fn schedule(plan: &PipelinePlan) -> Vec<DrawOp> {
    let mut ops = Vec::new();

    for (stage_index, stage) in plan.stages.iter().enumerate() {
        let StagePlan::Active { label, passes, .. } = stage else {
            continue;
        };

        for pass in passes {
            ops.push(DrawOp {
                stage: stage_index,
                pass: pass.ordinal,
                label: format!("{} / {}", label, pass.label),
                fragment: pass.fragment,
                target: pass.target,
                source: pass.source,
                dependencies: pass.dependencies.clone(),
            });
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::Resolution;
    use crate::scale::ScaleFactor;
    use crate::stage::{PassTemplate, StageOutput, StageTemplate, plan_pipeline};
    use crate::surface::SurfaceFormat;

    const CHAIN: &[PassTemplate] = &[
        PassTemplate {
            label: "a",
            fragment: "// a",
            when: None,
            dependencies: &[],
        },
        PassTemplate {
            label: "b",
            fragment: "// b",
            when: None,
            dependencies: &[0],
        },
    ];

    const GATED: &[PassTemplate] = &[PassTemplate {
        label: "gated",
        fragment: "// gated",
        when: Some("OUTPUT.w MAIN.w / 1.2 >"),
        dependencies: &[],
    }];

    fn templates() -> [StageTemplate; 2] {
        [
            StageTemplate {
                label: "first",
                passes: CHAIN,
                output: StageOutput::Scaled(ScaleFactor::UNITY),
            },
            StageTemplate {
                label: "second",
                passes: GATED,
                output: StageOutput::Scaled(ScaleFactor::new(2, 1)),
            },
        ]
    }

    #[test]
    fn preserves_declaration_order_across_stages() {
        let native = Resolution::new(100, 100).unwrap();
        let target = Resolution::new(200, 200).unwrap();
        let plan = plan_pipeline(&templates(), native, target, SurfaceFormat::Rgba8Unorm).unwrap();
        let ops = schedule(&plan);

        let order: Vec<(usize, usize)> = ops.iter().map(|op| (op.stage, op.pass)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);

        // Pass b samples pass a's output, recorded strictly after it.
        assert_eq!(ops[1].dependencies, vec![ops[0].target]);
    }

    #[test]
    fn bypassed_stage_emits_zero_operations() {
        // Target equals native, so the gated upscale stage bypasses.
        let native = Resolution::new(100, 100).unwrap();
        let plan = plan_pipeline(&templates(), native, native, SurfaceFormat::Rgba8Unorm).unwrap();
        let ops = schedule(&plan);

        assert!(ops.iter().all(|op| op.stage == 0));
        assert_eq!(ops.len(), 2);
        // The run's output falls through to the first stage's output surface.
        assert_eq!(plan.output, plan.stages[0].output());
    }
}
