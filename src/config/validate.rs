// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{PipelineFile, RawPipelineFile, TargetConfig};
use crate::dag::analyzer::is_valid_target_name;
use crate::errors::{PipelineError, Result};

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = PipelineError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;

        let target_timeout = parse_optional_duration("[config].target_timeout", &raw.config.target_timeout)?;
        let timeouts = raw
            .target
            .iter()
            .map(|t| parse_optional_duration(&format!("target '{}' timeout", t.name), &t.timeout))
            .collect::<Result<Vec<_>>>()?;

        Ok(PipelineFile::new_unchecked(
            raw.config,
            raw.target,
            target_timeout,
            timeouts,
        ))
    }
}

fn validate_raw_pipeline(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_targets(cfg)?;
    validate_global_config(cfg)?;
    for target in &cfg.target {
        validate_target(target)?;
    }
    Ok(())
}

fn ensure_has_targets(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.target.is_empty() {
        return Err(PipelineError::ConfigError(
            "pipeline must contain at least one [[target]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.config.worker_concurrency == Some(0) {
        return Err(PipelineError::ConfigError(
            "[config].worker_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if !cfg.config.renderer.contains("{input}") {
        return Err(PipelineError::ConfigError(
            "[config].renderer must contain an {input} placeholder".to_string(),
        ));
    }

    Ok(())
}

fn validate_target(target: &TargetConfig) -> Result<()> {
    if !is_valid_target_name(&target.name) {
        return Err(PipelineError::InvalidName(target.name.clone()));
    }

    match (&target.cmd, &target.render) {
        (Some(_), None) => {
            if target.output.is_some() {
                return Err(PipelineError::ConfigError(format!(
                    "target '{}': `output` only applies to render targets",
                    target.name
                )));
            }
        }
        (None, Some(_)) => {}
        (Some(_), Some(_)) => {
            return Err(PipelineError::ConfigError(format!(
                "target '{}' sets both `cmd` and `render`",
                target.name
            )));
        }
        (None, None) => {
            return Err(PipelineError::ConfigError(format!(
                "target '{}' needs either `cmd` or `render`",
                target.name
            )));
        }
    }

    Ok(())
}

fn parse_optional_duration(what: &str, value: &Option<String>) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(|s| {
            parse_duration(s)
                .map_err(|e| PipelineError::ConfigError(format!("{what}: {e}")))
        })
        .transpose()
}

/// Parse a duration string like `"500ms"`, `"3s"`, `"2m"`, or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{s}'"))
}
