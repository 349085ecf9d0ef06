//! The microphone check, unit by unit.
//!
//! | id | scope | permission | kind |
//! |----|-------|------------|------|
//! | `environment-support` | environment | no | capability |
//! | `permission-status` | site | no | permission status |
//! | `device-enumeration` | site | no | device enumeration |
//! | `audio-stream` | device | yes | stream acquisition |
//! | `noise-floor` | device | yes | signal analysis |
//! | `signal-analysis` | device | yes | signal analysis |
//! | `channel-balance` | device | yes | report |

use async_trait::async_trait;

use crate::audio::{run_pass, PassReport, PassSettings, Rating, RatingTable};
use crate::host::PermissionState;

use super::context::{DiagnosticContext, NoiseMeasurement, SpeechMeasurement};
use super::error::DiagnosticError;
use super::outcome::{Details, DiagnosticOutcome, OutcomeStatus, ResultsTable};
use super::unit::{DiagnosticUnit, Scope, UnitEnv, UnitInfo, UnitKind};

/// The full check in execution order.
pub fn default_units() -> Vec<Box<dyn DiagnosticUnit>> {
    vec![
        Box::new(EnvironmentSupport),
        Box::new(PermissionStatus),
        Box::new(DeviceEnumeration),
        Box::new(AudioStream),
        Box::new(NoiseFloor),
        Box::new(SignalAnalysis),
        Box::new(ChannelBalanceCheck),
    ]
}

fn rating_status(rating: Rating) -> OutcomeStatus {
    match rating {
        Rating::Good => OutcomeStatus::Pass,
        Rating::Marginal => OutcomeStatus::Warn,
        Rating::Poor => OutcomeStatus::Fail,
    }
}

fn outcome(status: OutcomeStatus, message: String) -> DiagnosticOutcome {
    match status {
        OutcomeStatus::Pass => DiagnosticOutcome::pass(message),
        OutcomeStatus::Fail => DiagnosticOutcome::fail(message),
        OutcomeStatus::Warn => DiagnosticOutcome::warn(message),
        OutcomeStatus::Skip => DiagnosticOutcome::skip(message),
        OutcomeStatus::Info => DiagnosticOutcome::info(message),
    }
}

fn pass_details(report: &PassReport) -> Details {
    Details::new()
        .with("averageLevelDb", report.average_level_db)
        .with("ticks", report.ticks)
        .with("failedTicks", report.failed_ticks)
        .with("blocks", report.blocks)
        .with("uncoveredSamples", report.uncovered_samples)
}

// ---------------------------------------------------------------------------
// environment-support
// ---------------------------------------------------------------------------

pub struct EnvironmentSupport;

const ENVIRONMENT_SUPPORT: UnitInfo = UnitInfo {
    id: "environment-support",
    name: "Environment support",
    description: "Checks that the host can list, open and read audio inputs.",
    scope: Scope::Environment,
    requires_permission: false,
    kind: UnitKind::Capability,
};

#[async_trait]
impl DiagnosticUnit for EnvironmentSupport {
    fn info(&self) -> &UnitInfo {
        &ENVIRONMENT_SUPPORT
    }

    async fn test(
        &self,
        ctx: &mut DiagnosticContext,
        env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError> {
        let caps = env.host.capabilities.capabilities();
        ctx.capabilities = Some(caps);

        let missing = caps.missing();
        if missing.is_empty() {
            return Ok(DiagnosticOutcome::pass(
                "The environment supports microphone access.",
            ));
        }

        let err = DiagnosticError::EnvironmentUnsupported(missing.clone());
        Ok(DiagnosticOutcome::fail(err.to_string())
            .with_details(Details::new().with("missing", missing))
            .with_optional_fix(err.fix()))
    }
}

// ---------------------------------------------------------------------------
// permission-status
// ---------------------------------------------------------------------------

pub struct PermissionStatus;

const PERMISSION_STATUS: UnitInfo = UnitInfo {
    id: "permission-status",
    name: "Microphone permission",
    description: "Reports whether microphone access has been granted.",
    scope: Scope::Site,
    requires_permission: false,
    kind: UnitKind::PermissionStatus,
};

#[async_trait]
impl DiagnosticUnit for PermissionStatus {
    fn info(&self) -> &UnitInfo {
        &PERMISSION_STATUS
    }

    async fn test(
        &self,
        ctx: &mut DiagnosticContext,
        env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError> {
        let state = env.host.permissions.query().await;
        ctx.permission = Some(state);
        let details = Details::new().with("state", state);

        let outcome = match state {
            PermissionState::Granted => {
                DiagnosticOutcome::pass("Microphone access is granted.")
            }
            PermissionState::Prompt => DiagnosticOutcome::info(
                "Microphone access will be requested when the stream is opened.",
            ),
            PermissionState::Unsupported => DiagnosticOutcome::info(
                "The host does not report microphone permission; access is verified when the stream opens.",
            ),
            PermissionState::Denied => {
                let err = DiagnosticError::PermissionDenied;
                DiagnosticOutcome::fail(err.to_string()).with_optional_fix(err.fix())
            }
        };
        Ok(outcome.with_details(details))
    }
}

// ---------------------------------------------------------------------------
// device-enumeration
// ---------------------------------------------------------------------------

pub struct DeviceEnumeration;

const DEVICE_ENUMERATION: UnitInfo = UnitInfo {
    id: "device-enumeration",
    name: "Input devices",
    description: "Lists the microphones the host can see.",
    scope: Scope::Site,
    requires_permission: false,
    kind: UnitKind::DeviceEnumeration,
};

#[async_trait]
impl DiagnosticUnit for DeviceEnumeration {
    fn info(&self) -> &UnitInfo {
        &DEVICE_ENUMERATION
    }

    async fn test(
        &self,
        ctx: &mut DiagnosticContext,
        env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError> {
        ctx.devices = Some(env.host.devices.enumerate().await?);

        let labels: Vec<&str> = ctx.input_devices().map(|d| d.label.as_str()).collect();
        let count = labels.len();
        let details = Details::new().with("count", count).with("devices", &labels);

        if count == 0 {
            let err = DiagnosticError::DeviceAbsent;
            return Ok(DiagnosticOutcome::fail(err.to_string())
                .with_details(details)
                .with_optional_fix(err.fix()));
        }

        if let Some(selected) = ctx.selected_device.as_deref() {
            if !ctx.input_devices().any(|d| d.id == selected) {
                return Ok(DiagnosticOutcome::warn(format!(
                    "The selected microphone \"{selected}\" is not connected."
                ))
                .with_details(details)
                .with_fix("Reconnect the microphone or choose another device."));
            }
        }

        if labels.iter().any(|l| l.is_empty()) {
            return Ok(DiagnosticOutcome::info(format!(
                "{count} microphone(s) found; names are hidden until access is granted."
            ))
            .with_details(details));
        }

        Ok(DiagnosticOutcome::pass(format!("{count} microphone(s) found.")).with_details(details))
    }
}

// ---------------------------------------------------------------------------
// audio-stream
// ---------------------------------------------------------------------------

pub struct AudioStream;

const AUDIO_STREAM: UnitInfo = UnitInfo {
    id: "audio-stream",
    name: "Audio stream",
    description: "Opens a live input stream on the selected microphone.",
    scope: Scope::Device,
    requires_permission: true,
    kind: UnitKind::StreamAcquisition,
};

#[async_trait]
impl DiagnosticUnit for AudioStream {
    fn info(&self) -> &UnitInfo {
        &AUDIO_STREAM
    }

    async fn test(
        &self,
        ctx: &mut DiagnosticContext,
        env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError> {
        ctx.release_resources();

        let stream = env
            .host
            .capture
            .acquire(ctx.selected_device.as_deref())
            .await?;
        let info = stream.info();
        ctx.stream_info = Some(info);
        ctx.stream = Some(stream);

        Ok(DiagnosticOutcome::pass(format!(
            "Audio stream opened at {} Hz with {} channel(s).",
            info.sample_rate, info.channel_count
        ))
        .with_details(
            Details::new()
                .with("sampleRate", info.sample_rate)
                .with("channelCount", info.channel_count)
                .with("autoGainControl", info.auto_gain_control),
        ))
    }
}

// ---------------------------------------------------------------------------
// noise-floor
// ---------------------------------------------------------------------------

pub struct NoiseFloor;

const NOISE_FLOOR: UnitInfo = UnitInfo {
    id: "noise-floor",
    name: "Background noise",
    description: "Measures the room with nobody speaking.",
    scope: Scope::Device,
    requires_permission: true,
    kind: UnitKind::SignalAnalysis,
};

#[async_trait]
impl DiagnosticUnit for NoiseFloor {
    fn info(&self) -> &UnitInfo {
        &NOISE_FLOOR
    }

    fn can_run(&self, ctx: &DiagnosticContext, _results: &ResultsTable) -> bool {
        ctx.stream.is_some()
    }

    fn skip_reason(&self) -> String {
        "No audio stream is open.".to_string()
    }

    async fn test(
        &self,
        ctx: &mut DiagnosticContext,
        env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError> {
        let stream = ctx
            .stream
            .as_mut()
            .ok_or_else(|| DiagnosticError::Measurement("no audio stream is open".into()))?;

        log::info!("noise-floor: stay quiet for {:?}", env.config.sampling.noise_duration());
        let settings = PassSettings {
            duration: env.config.sampling.noise_duration(),
            interval: env.config.sampling.interval(),
        };
        let report = run_pass(
            &mut **stream,
            env.clock.as_ref(),
            settings,
            &env.config.loudness,
            env.progress.as_deref(),
        )
        .await?;

        // Below the absolute gate there is nothing to rate: the room is silent.
        let floor = report.ungated_lufs;
        let rating = floor.map_or(Rating::Good, |l| RatingTable::NoiseFloor.rate(l));
        ctx.noise_floor = Some(NoiseMeasurement {
            loudness_lufs: floor,
            rating,
        });

        let details = pass_details(&report)
            .with("noiseFloorLufs", floor)
            .with("rating", rating);
        let message = match floor {
            None => "Background noise is below the measurable floor.".to_string(),
            Some(l) => format!("Background noise is {} ({l:.1} LUFS).", rating.label()),
        };

        let outcome = outcome(rating_status(rating), message).with_details(details);
        Ok(match rating {
            Rating::Good => outcome,
            _ => outcome.with_fix("Move to a quieter room or away from fans and other noise sources."),
        })
    }
}

// ---------------------------------------------------------------------------
// signal-analysis
// ---------------------------------------------------------------------------

pub struct SignalAnalysis;

const SIGNAL_ANALYSIS: UnitInfo = UnitInfo {
    id: "signal-analysis",
    name: "Speech level",
    description: "Measures loudness, peak level and signal-to-noise ratio while you speak.",
    scope: Scope::Device,
    requires_permission: true,
    kind: UnitKind::SignalAnalysis,
};

struct Finding {
    status: OutcomeStatus,
    message: String,
    fix: &'static str,
}

fn severity(status: OutcomeStatus) -> u8 {
    match status {
        OutcomeStatus::Fail => 2,
        OutcomeStatus::Warn => 1,
        _ => 0,
    }
}

#[async_trait]
impl DiagnosticUnit for SignalAnalysis {
    fn info(&self) -> &UnitInfo {
        &SIGNAL_ANALYSIS
    }

    fn can_run(&self, ctx: &DiagnosticContext, _results: &ResultsTable) -> bool {
        ctx.stream.is_some()
    }

    fn skip_reason(&self) -> String {
        "No audio stream is open.".to_string()
    }

    async fn test(
        &self,
        ctx: &mut DiagnosticContext,
        env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError> {
        let agc = ctx.stream_info.map_or(false, |i| i.auto_gain_control);
        let stream = ctx
            .stream
            .as_mut()
            .ok_or_else(|| DiagnosticError::Measurement("no audio stream is open".into()))?;

        log::info!("signal-analysis: speak normally for {:?}", env.config.sampling.speech_duration());
        let settings = PassSettings {
            duration: env.config.sampling.speech_duration(),
            interval: env.config.sampling.interval(),
        };
        let report = run_pass(
            &mut **stream,
            env.clock.as_ref(),
            settings,
            &env.config.loudness,
            env.progress.as_deref(),
        )
        .await?;

        let table = RatingTable::loudness_for(agc);
        let loudness = report.integrated_lufs;
        let loudness_rating = loudness.map(|l| table.rate(l));
        let clipping = report.peak_db >= env.config.analysis.clipping_dbfs;
        let noise = ctx.noise_floor.and_then(|n| n.loudness_lufs);
        let snr = loudness.zip(noise).map(|(s, n)| s - n);
        let snr_rating = snr.map(|s| RatingTable::SignalToNoise.rate(s));

        ctx.speech = Some(SpeechMeasurement {
            loudness_lufs: loudness,
            loudness_rating,
            peak_dbfs: report.peak_db,
            clipping,
            snr_db: snr,
            snr_rating,
        });
        ctx.channel_balance = report.channel_balance(&env.config.balance);

        let details = pass_details(&report)
            .with("loudnessLufs", loudness)
            .with("loudnessRating", loudness_rating)
            .with("ratingTable", table)
            .with("peakDbfs", report.peak_db)
            .with("clipping", clipping)
            .with("snrDb", snr)
            .with("snrRating", snr_rating);

        let mut findings = Vec::new();
        match (loudness, loudness_rating) {
            (Some(l), Some(rating)) if rating != Rating::Good => findings.push(Finding {
                status: rating_status(rating),
                message: format!("Speech level is {} ({l:.1} LUFS).", rating.label()),
                fix: "Move closer to the microphone or raise its input gain.",
            }),
            (None, _) => findings.push(Finding {
                status: OutcomeStatus::Warn,
                message: "No speech was detected.".to_string(),
                fix: "Speak normally into the microphone while the test runs.",
            }),
            _ => {}
        }
        if clipping {
            findings.push(Finding {
                status: OutcomeStatus::Warn,
                message: format!("The signal clips (peak {:.1} dBFS).", report.peak_db),
                fix: "Lower the microphone's input gain.",
            });
        }
        if let (Some(s), Some(rating)) = (snr, snr_rating) {
            if rating != Rating::Good {
                findings.push(Finding {
                    status: OutcomeStatus::Warn,
                    message: format!("Speech is only {s:.1} dB above the background noise."),
                    fix: "Reduce background noise or move closer to the microphone.",
                });
            }
        }

        let Some(worst) = findings.iter().max_by_key(|f| severity(f.status)) else {
            let message = match loudness {
                Some(l) => format!("Speech level is good ({l:.1} LUFS)."),
                None => "Speech level is good.".to_string(),
            };
            return Ok(DiagnosticOutcome::pass(message).with_details(details));
        };

        let message = findings
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(outcome(worst.status, message)
            .with_details(details)
            .with_fix(worst.fix))
    }
}

// ---------------------------------------------------------------------------
// channel-balance
// ---------------------------------------------------------------------------

pub struct ChannelBalanceCheck;

const CHANNEL_BALANCE: UnitInfo = UnitInfo {
    id: "channel-balance",
    name: "Channel balance",
    description: "Checks that both channels of a stereo input carry the signal.",
    scope: Scope::Device,
    requires_permission: true,
    kind: UnitKind::Report,
};

#[async_trait]
impl DiagnosticUnit for ChannelBalanceCheck {
    fn info(&self) -> &UnitInfo {
        &CHANNEL_BALANCE
    }

    fn can_run(&self, ctx: &DiagnosticContext, _results: &ResultsTable) -> bool {
        ctx.speech.is_some()
    }

    fn skip_reason(&self) -> String {
        "The speech measurement did not complete.".to_string()
    }

    async fn test(
        &self,
        ctx: &mut DiagnosticContext,
        _env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError> {
        let channels = ctx.stream_info.map_or(0, |i| i.channel_count);
        if channels < 2 {
            return Ok(DiagnosticOutcome::skip(
                "The input is mono; channel balance does not apply.",
            ));
        }
        let Some(balance) = ctx.channel_balance.as_ref() else {
            return Ok(DiagnosticOutcome::skip("No channel levels were recorded."));
        };

        let details = Details::new()
            .with("left", balance.left)
            .with("right", balance.right)
            .with("differenceDb", balance.difference_db)
            .with("deadChannel", balance.dead_channel);

        match balance.dead_channel {
            Some(dead) => Ok(DiagnosticOutcome::warn(format!(
                "The {} channel carries almost no signal ({:.1} dB quieter).",
                dead.label(),
                balance.difference_db
            ))
            .with_details(details)
            .with_fix(
                "Set the audio interface to mono, or plug the microphone into the other input.",
            )),
            None => Ok(DiagnosticOutcome::pass(format!(
                "Both channels carry the signal ({:.1} dB apart).",
                balance.difference_db
            ))
            .with_details(details)),
        }
    }
}
