//! System TTS engine (spd-say / espeak-ng)

use super::{TtsEngine, VoiceInfo, VoiceSettings};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SystemEngine;

impl SystemEngine {
    pub fn new() -> Self {
        Self
    }

    fn spd_say_args(text: &str, settings: &VoiceSettings) -> Vec<String> {
        let scale = |v: f32| (((v - 1.0) * 100.0).round() as i32).clamp(-100, 100);
        let mut args = vec![
            "--wait".to_string(),
            "-r".to_string(),
            scale(settings.rate).to_string(),
            "-p".to_string(),
            scale(settings.pitch).to_string(),
            "-i".to_string(),
            (((settings.volume * 200.0) - 100.0).round() as i32)
                .clamp(-100, 100)
                .to_string(),
        ];
        if let Some(voice) = &settings.voice {
            args.push("-l".to_string());
            args.push(voice.lang.clone());
        }
        args.push(text.to_string());
        args
    }

    fn espeak_args(text: &str, settings: &VoiceSettings) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            ((175.0 * settings.rate).round() as i32).clamp(80, 450).to_string(),
            "-p".to_string(),
            ((50.0 * settings.pitch).round() as i32).clamp(0, 99).to_string(),
            "-a".to_string(),
            ((100.0 * settings.volume).round() as i32).clamp(0, 200).to_string(),
        ];
        if let Some(voice) = &settings.voice {
            args.push("-v".to_string());
            args.push(voice.name.clone());
        }
        args.push(text.to_string());
        args
    }

    /// Run a speech command; `Ok(false)` when the program is not installed
    async fn run(program: &str, args: &[String]) -> Result<bool> {
        let child = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let status = child.wait().await?;
        if !status.success() {
            bail!("{} exited with {}", program, status);
        }
        Ok(true)
    }
}

/// Parse `espeak-ng --voices` output
fn parse_espeak_voices(output: &str) -> Vec<VoiceInfo> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [_, lang, _, name, ..] => Some(VoiceInfo::new(*name, *lang)),
                _ => None,
            }
        })
        .collect()
}

#[async_trait]
impl TtsEngine for SystemEngine {
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()> {
        debug!("System speaking: {}", text);

        if Self::run("spd-say", &Self::spd_say_args(text, settings)).await? {
            return Ok(());
        }

        if Self::run("espeak-ng", &Self::espeak_args(text, settings)).await? {
            return Ok(());
        }

        Err(anyhow::anyhow!(
            "No system TTS command found (tried spd-say, espeak-ng)"
        ))
    }

    async fn cancel(&self) -> Result<()> {
        // espeak-ng children are killed when their speak future is dropped
        let _ = Self::run("spd-say", &["--cancel".to_string()]).await;
        Ok(())
    }

    async fn list_voices(&self) -> Vec<VoiceInfo> {
        match Command::new("espeak-ng").arg("--voices").output().await {
            Ok(output) if output.status.success() => {
                parse_espeak_voices(&String::from_utf8_lossy(&output.stdout))
            }
            _ => Vec::new(),
        }
    }

    fn name(&self) -> &str {
        "system"
    }
}
