//! Analysis strategies wrapping the external tools.
//!
//! Exactly one strategy is active, chosen by
//! [`Settings::analysis_strategy`](crate::config::Settings):
//!
//! | Strategy            | Declared bitrate | Measured value          | Verdict by  |
//! |---------------------|------------------|-------------------------|-------------|
//! | `declared-probe`    | probe            | probe (stream bitrate)  | comparator  |
//! | `true-bitrate-tool` | probe            | true-bitrate estimate   | comparator  |
//! | `spectral-tool`     | -                | spectral cutoff         | the tool    |

pub mod probe;
pub mod spectral;
pub mod true_bitrate;

use std::path::Path;

use crate::config::{AnalysisStrategy, Timings, ToolPaths};
use crate::error::Result;
use crate::models::Measurement;

pub use probe::ProbeTool;
pub use spectral::SpectralTool;
pub use true_bitrate::TrueBitrateTool;

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "m4a", "aac", "opus", "wma", "alac", "ape", "wav",
];

/// Check if a path has a recognized audio file extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub enum Analyzer {
    DeclaredProbe { probe: ProbeTool },
    TrueBitrate { probe: ProbeTool, estimator: TrueBitrateTool },
    Spectral { checker: SpectralTool },
}

impl Analyzer {
    pub fn new(strategy: AnalysisStrategy, tools: &ToolPaths, timings: &Timings) -> Self {
        let probe = || ProbeTool::new(&tools.probe, timings.probe_timeout);
        match strategy {
            AnalysisStrategy::DeclaredProbe => Analyzer::DeclaredProbe { probe: probe() },
            AnalysisStrategy::TrueBitrateTool => Analyzer::TrueBitrate {
                probe: probe(),
                estimator: TrueBitrateTool::new(&tools.true_bitrate, timings.analysis_timeout),
            },
            AnalysisStrategy::SpectralTool => Analyzer::Spectral {
                checker: SpectralTool::new(&tools.spectral, timings.analysis_timeout),
            },
        }
    }

    pub fn strategy(&self) -> AnalysisStrategy {
        match self {
            Analyzer::DeclaredProbe { .. } => AnalysisStrategy::DeclaredProbe,
            Analyzer::TrueBitrate { .. } => AnalysisStrategy::TrueBitrateTool,
            Analyzer::Spectral { .. } => AnalysisStrategy::SpectralTool,
        }
    }

    /// Name of the tool that does the measuring, for log lines.
    pub fn tool_name(&self) -> String {
        match self {
            Analyzer::DeclaredProbe { probe } => probe.name(),
            Analyzer::TrueBitrate { estimator, .. } => estimator.name(),
            Analyzer::Spectral { checker } => checker.name(),
        }
    }

    pub fn measure(&self, path: &Path) -> Result<Measurement> {
        match self {
            Analyzer::DeclaredProbe { probe } => {
                let declared_kbps = probe.declared_bitrate(path)?;
                let measured_kbps = probe.stream_bitrate(path)?;
                Ok(Measurement::Bitrates {
                    declared_kbps,
                    measured_kbps,
                })
            }
            Analyzer::TrueBitrate { probe, estimator } => {
                let declared_kbps = probe.declared_bitrate(path)?;
                let measured_kbps = estimator.measure(path)?;
                Ok(Measurement::Bitrates {
                    declared_kbps,
                    measured_kbps,
                })
            }
            Analyzer::Spectral { checker } => {
                let report = checker.check(path)?;
                Ok(Measurement::Verdict {
                    status: report.status,
                    reason: report.reason(),
                    claimed_kbps: report.claimed_kbps,
                    cutoff_hz: report.cutoff_hz,
                })
            }
        }
    }
}
