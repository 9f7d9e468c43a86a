pub mod config;
pub mod doctor;
pub mod migrate;
pub mod smoke;

pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self { exit_code: 1, output: output.into() }
    }
}

/// CLI commands run on a private current-thread runtime; the binary has no
/// long-lived async work.
pub(crate) fn block_on<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to start runtime: {error}"))?;
    Ok(runtime.block_on(future))
}
