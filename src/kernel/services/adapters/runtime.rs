use std::io;

/// 后台扫描用的 tokio runtime
///
/// 扫描任务只通过 `Handle::spawn` 投递，没有线程会 `block_on`，
/// 所以必须是 multi-thread runtime。
pub struct AsyncRuntime {
    runtime: tokio::runtime::Runtime,
}

impl AsyncRuntime {
    pub fn new() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("zsearch-worker")
            .enable_all()
            .build()
            .inspect_err(|e| {
                tracing::error!(error = %e, "Failed to create tokio runtime");
            })?;
        Ok(Self { runtime })
    }

    pub fn tokio_handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }
}
