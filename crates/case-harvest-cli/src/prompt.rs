//! Interactive CAPTCHA entry.
//!
//! The image is saved to disk and the operator types what they read. This is
//! just another [`CaptchaSolver`], so the run does not change shape when a
//! person solves instead of a service.

use async_trait::async_trait;
use case_harvest::error::{HarvestError, Result};
use case_harvest::solver::{CaptchaSolver, SolveResponse};
use std::io::{BufRead, Write};
use std::path::PathBuf;

pub struct PromptSolver {
    image_path: PathBuf,
}

impl PromptSolver {
    pub fn new(image_path: PathBuf) -> Self {
        Self { image_path }
    }
}

/// Read one line from `input` after writing `prompt` to `output`.
pub fn ask<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> std::io::Result<String> {
    write!(output, "{prompt}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[async_trait]
impl CaptchaSolver for PromptSolver {
    async fn solve(&self, image: &[u8]) -> Result<SolveResponse> {
        if let Some(parent) = self.image_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.image_path, image).await?;
        let prompt = format!(
            "CAPTCHA saved to {}\nEnter the CAPTCHA text: ",
            self.image_path.display()
        );
        let code = tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            ask(&prompt, &mut stdin.lock(), &mut std::io::stderr())
        })
        .await
        .map_err(|e| HarvestError::Solver(format!("prompt task failed: {e}")))??;
        Ok(SolveResponse { code })
    }
}
