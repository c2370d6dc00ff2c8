//! Stage assembly and dependency validation
//!
//! A stage template is a fixed, ordered list of pass descriptors; the last
//! pass is the stage's terminal pass and writes the stage output. Each pass
//! may carry an enablement condition and declares the upstream passes it
//! samples from by position. Assembly evaluates every condition against the
//! run's resolution context, validates the dependency graph, allocates the
//! intermediate surfaces, and resolves each pass's texture bindings.
//!
//! Two outcomes are deliberate policy rather than error handling:
//!
//! - A stage whose terminal pass is disabled collapses to a bypass: its
//!   output surface *is* its input surface and it contributes no draws.
//! - An enabled pass whose declared dependency is disabled aborts pipeline
//!   construction. The dependents are not auto-disabled; a template that
//!   gates a dependency without gating its consumers is an authoring bug
//!   and silently weakening the pipeline would mask it.

use tracing::{debug, info};

use crate::resolution::{Resolution, ResolutionContext};
use crate::scale::ScaleFactor;
use crate::surface::{SurfaceFormat, SurfaceId, SurfaceRole, SurfaceSpec, SurfaceTable};
use crate::when::{WhenError, WhenExpression, evaluate_opt};

/// One pass of a stage template
#[derive(Debug, Clone, Copy)]
pub struct PassTemplate {
    /// Debug label, also used for GPU resource labels
    pub label: &'static str,
    /// WGSL fragment shader source
    pub fragment: &'static str,
    /// Optional enablement condition; absent means always enabled
    pub when: Option<&'static str>,
    /// Positions of the upstream passes this pass samples, in binding order
    pub dependencies: &'static [usize],
}

/// How a stage sizes its output surface
#[derive(Debug, Clone, Copy)]
pub enum StageOutput {
    /// Scaled relative to the stage input (1x, 2x, 1/2x, ...)
    Scaled(ScaleFactor),
    /// Allocated at the run's declared output resolution
    Declared,
}

/// A fixed stage description: ordered passes, the last one terminal
#[derive(Debug, Clone, Copy)]
pub struct StageTemplate {
    /// Stage label for diagnostics and resource names
    pub label: &'static str,
    /// Ordered pass list; the final entry is the terminal pass
    pub passes: &'static [PassTemplate],
    /// Output surface sizing
    pub output: StageOutput,
}

/// A pass with its surface bindings resolved
#[derive(Debug, Clone)]
pub struct PassPlan {
    /// Pass label
    pub label: &'static str,
    /// WGSL fragment shader source
    pub fragment: &'static str,
    /// Position within the stage, kept for diagnostics
    pub ordinal: usize,
    /// Surface this pass renders into
    pub target: SurfaceId,
    /// The stage input surface, bound at binding 0
    pub source: SurfaceId,
    /// Dependency output surfaces, bound at bindings 2.. in declared order
    pub dependencies: Vec<SurfaceId>,
}

/// The assembled form of one stage
#[derive(Debug, Clone)]
pub enum StagePlan {
    /// Terminal pass disabled: the stage forwards its input unchanged
    Bypassed {
        /// Stage label
        label: &'static str,
        /// Alias of the stage input surface
        output: SurfaceId,
    },
    /// At least the terminal pass runs
    Active {
        /// Stage label
        label: &'static str,
        /// Enabled passes in declared order, terminal last
        passes: Vec<PassPlan>,
        /// The stage output surface
        output: SurfaceId,
        /// Resolution of the output surface
        output_resolution: Resolution,
    },
}

impl StagePlan {
    /// The surface the next stage (or the exporter) consumes
    pub fn output(&self) -> SurfaceId {
        match self {
            StagePlan::Bypassed { output, .. } | StagePlan::Active { output, .. } => *output,
        }
    }

    /// Stage label
    pub fn label(&self) -> &'static str {
        match self {
            StagePlan::Bypassed { label, .. } | StagePlan::Active { label, .. } => label,
        }
    }

    /// True if the stage forwards its input unchanged
    pub fn is_bypassed(&self) -> bool {
        matches!(self, StagePlan::Bypassed { .. })
    }
}

/// Errors raised during stage assembly
///
/// All of these are configuration-authoring failures: they abort pipeline
/// construction and are never recoverable at runtime.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A pass condition failed to parse or evaluate
    #[error("stage '{stage}': condition of pass {pass} is invalid")]
    Condition {
        /// Stage label
        stage: &'static str,
        /// Pass position within the stage
        pass: usize,
        /// Underlying expression error
        #[source]
        source: WhenError,
    },
    /// An enabled pass samples a pass that is disabled for this run
    #[error("stage '{stage}': pass {pass} requires pass {dependency}, which is disabled")]
    DisabledDependency {
        /// Stage label
        stage: &'static str,
        /// The dependent pass position
        pass: usize,
        /// The disabled dependency position
        dependency: usize,
    },
    /// A pass declares a dependency that is not strictly upstream of it
    #[error("stage '{stage}': pass {pass} declares dependency {dependency}, which is not upstream")]
    InvalidDependency {
        /// Stage label
        stage: &'static str,
        /// The declaring pass position
        pass: usize,
        /// The out-of-range dependency position
        dependency: usize,
    },
    /// The template has no passes at all
    #[error("stage '{stage}' has no passes")]
    EmptyStage {
        /// Stage label
        stage: &'static str,
    },
}

impl StageTemplate {
    /// Assembles this template for one run
    ///
    /// `ctx.main` must be the resolution of `input`. On success the returned
    /// plan either carries the enabled passes with resolved bindings, or is a
    /// bypass aliasing `input`.
    pub fn plan(&self, ctx: &ResolutionContext, input: SurfaceId, surfaces: &mut SurfaceTable) -> Result<StagePlan, StageError> {
        if self.passes.is_empty() {
            return Err(StageError::EmptyStage { stage: self.label });
        }
        let terminal = self.passes.len() - 1;

        // Evaluate every pass condition up front; the boolean vector is what
        // dependency validation and the bypass decision work from.
        let mut enabled = Vec::with_capacity(self.passes.len());
        for (ordinal, pass) in self.passes.iter().enumerate() {
            let expression = pass
                .when
                .map(WhenExpression::parse)
                .transpose()
                .map_err(|source| StageError::Condition {
                    stage: self.label,
                    pass: ordinal,
                    source,
                })?;
            let on = evaluate_opt(expression.as_ref(), ctx).map_err(|source| StageError::Condition {
                stage: self.label,
                pass: ordinal,
                source,
            })?;
            debug!(stage = self.label, pass = ordinal, pass_label = pass.label, enabled = on, "evaluated pass condition");
            enabled.push(on);
        }

        // Reject direct dependency violations before deciding anything else.
        // Disabled passes without enabled dependents are fine; only an
        // enabled pass sampling a disabled one is a configuration bug.
        for (ordinal, pass) in self.passes.iter().enumerate() {
            if !enabled[ordinal] {
                continue;
            }
            for &dependency in pass.dependencies {
                if dependency >= ordinal {
                    return Err(StageError::InvalidDependency {
                        stage: self.label,
                        pass: ordinal,
                        dependency,
                    });
                }
                if !enabled[dependency] {
                    return Err(StageError::DisabledDependency {
                        stage: self.label,
                        pass: ordinal,
                        dependency,
                    });
                }
            }
        }

        if !enabled[terminal] {
            info!(stage = self.label, "terminal pass disabled, stage bypassed");
            return Ok(StagePlan::Bypassed {
                label: self.label,
                output: input,
            });
        }

        let working = ctx.main;
        let output_resolution = match self.output {
            StageOutput::Scaled(factor) => Resolution {
                width: factor.apply(working.width),
                height: factor.apply(working.height),
            },
            StageOutput::Declared => ctx.output,
        };

        let output = surfaces.push(SurfaceSpec {
            label: format!("{} output", self.label),
            width: output_resolution.width,
            height: output_resolution.height,
            format: SurfaceFormat::Rgba16Float,
            role: SurfaceRole::Intermediate,
        });

        // One intermediate surface per enabled non-terminal pass, all at the
        // stage working resolution; the terminal pass writes the stage output.
        let mut pass_outputs: Vec<Option<SurfaceId>> = vec![None; self.passes.len()];
        let mut passes = Vec::new();
        for (ordinal, pass) in self.passes.iter().enumerate() {
            if !enabled[ordinal] {
                continue;
            }

            let target = if ordinal == terminal {
                output
            } else {
                surfaces.push(SurfaceSpec {
                    label: format!("{} {}", self.label, pass.label),
                    width: working.width,
                    height: working.height,
                    format: SurfaceFormat::Rgba16Float,
                    role: SurfaceRole::Intermediate,
                })
            };
            pass_outputs[ordinal] = Some(target);

            let dependencies = pass
                .dependencies
                .iter()
                .map(|&dependency| pass_outputs[dependency].expect("validated upstream dependency"))
                .collect();

            passes.push(PassPlan {
                label: pass.label,
                fragment: pass.fragment,
                ordinal,
                target,
                source: input,
                dependencies,
            });
        }

        Ok(StagePlan::Active {
            label: self.label,
            passes,
            output,
            output_resolution,
        })
    }
}

/// A fully planned pipeline run
#[derive(Debug)]
pub struct PipelinePlan {
    /// All surfaces the run needs, source first
    pub surfaces: SurfaceTable,
    /// Assembled stages in execution order
    pub stages: Vec<StagePlan>,
    /// The caller-provided input surface
    pub source: SurfaceId,
    /// The surface holding the final result
    pub output: SurfaceId,
    /// Resolution of the final result
    pub output_resolution: Resolution,
    /// The run's native input resolution
    pub native: Resolution,
    /// The run's declared target resolution
    pub declared_output: Resolution,
}

/// Plans a pipeline run over a fixed stage sequence
///
/// Chains stages left to right: each stage's `MAIN` resolution is the output
/// resolution of the previous active stage (bypassed stages leave it
/// untouched). Fails fast on the first assembly error.
pub fn plan_pipeline(
    templates: &[StageTemplate],
    native: Resolution,
    declared_output: Resolution,
    source_format: SurfaceFormat,
) -> Result<PipelinePlan, StageError> {
    let mut surfaces = SurfaceTable::new();
    let source = surfaces.push(SurfaceSpec {
        label: "source".to_string(),
        width: native.width,
        height: native.height,
        format: source_format,
        role: SurfaceRole::Source,
    });

    let base_ctx = ResolutionContext::at_native(native, declared_output);
    let mut current = source;
    let mut current_resolution = native;
    let mut stages = Vec::with_capacity(templates.len());

    for template in templates {
        let ctx = base_ctx.with_main(current_resolution);
        let plan = template.plan(&ctx, current, &mut surfaces)?;
        if let StagePlan::Active { output, output_resolution, .. } = &plan {
            current = *output;
            current_resolution = *output_resolution;
        }
        stages.push(plan);
    }

    // The run's result surface is read back for export.
    let output_spec = surfaces.get_mut(current);
    if output_spec.role == SurfaceRole::Intermediate {
        output_spec.role = SurfaceRole::Export;
    }

    Ok(PipelinePlan {
        surfaces,
        stages,
        source,
        output: current,
        output_resolution: current_resolution,
        native,
        declared_output,
    })
}
