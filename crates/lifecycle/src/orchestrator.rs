//! Lifecycle Orchestrator
//!
//! Sequences ldconsole calls into instance workflows:
//! - creation from a template (modify, apks, certificates, proxy)
//! - launch and wait for Android to boot
//! - quit and wait for the emulator to stop
//! - status reads that always come from a fresh listing
//!
//! Nothing is cached between calls. Each step's failure ends the workflow and
//! is returned unchanged; steps already done are not rolled back.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ldfleet_console_bridge::{parse_list2, LdConsole, GLOBAL_NAMESPACE};
use ldfleet_core::{
    AppConfig, CreationConfig, CreationRequest, Instance, InstanceStatus, LdError, PollingConfig,
    ProxySettings, Result,
};

use crate::locks::{IndexGuard, IndexLocks};
use crate::wait::{FirstCheck, PollSpec, Poller};

/// Android system trust store
pub const CACERTS_DIR: &str = "/system/etc/security/cacerts";

pub const PROXY_HOST_KEY: &str = "global_http_proxy_host";
pub const PROXY_PORT_KEY: &str = "global_http_proxy_port";
pub const PROXY_EXCLUSION_KEY: &str = "global_http_proxy_exclusion_list";

/// Drives instance lifecycles through ldconsole
pub struct Orchestrator {
    console: LdConsole,
    polling: PollingConfig,
    creation: CreationConfig,
    poller: Poller,
    locks: IndexLocks,
}

impl Orchestrator {
    /// Create an orchestrator with its own cancellation token
    pub fn new(console: LdConsole, config: &AppConfig) -> Self {
        Self {
            console,
            polling: config.polling.clone(),
            creation: config.creation.clone(),
            poller: Poller::new(CancellationToken::new()),
            locks: IndexLocks::new(),
        }
    }

    /// Interrupt every wait when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.poller = Poller::new(token);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.poller.cancellation_token().clone()
    }

    pub fn console(&self) -> &LdConsole {
        &self.console
    }

    /// One instance, or `None` if ldconsole does not list it
    pub async fn get(&self, index: i32) -> Result<Option<Instance>> {
        let status = self.listing().await?.into_iter().find(|s| s.index == index);
        match status {
            Some(status) => {
                let running = self.console.is_running(index).await?;
                Ok(Some(Instance::from_status(status, running)))
            }
            None => Ok(None),
        }
    }

    /// Every listed instance with a fresh running check each
    pub async fn get_all(&self) -> Result<Vec<Instance>> {
        let statuses = self.listing().await?;
        let mut instances = Vec::with_capacity(statuses.len());
        for status in statuses {
            let running = self.console.is_running(status.index).await?;
            instances.push(Instance::from_status(status, running));
        }
        Ok(instances)
    }

    /// Android-ready flag from a fresh listing; unlisted instances are not ready
    pub async fn is_android_ready(&self, index: i32) -> Result<bool> {
        Ok(self
            .listing()
            .await?
            .iter()
            .find(|s| s.index == index)
            .is_some_and(|s| s.android_ready))
    }

    /// Build a new instance from `request.source_index`.
    ///
    /// Order: copy, modify, apks, certificates, proxy, then either boot
    /// (reboot when a proxy was set, launch otherwise) or quit.
    pub async fn create(&self, request: &CreationRequest) -> Result<Instance> {
        info!(
            "Creating instance '{}' from index {}",
            request.name, request.source_index
        );

        let index = self.copy_template(request).await?;
        let _guard = self.lock(index).await?;
        info!("Copied index {} to new index {}", request.source_index, index);

        if request.has_device_overrides() {
            self.console
                .modify(index)
                .manufacturer(request.manufacturer.as_deref())
                .model(request.model.as_deref())
                .run()
                .await?;
        }

        for apk in &request.apk_paths {
            self.install_apk_locked(index, apk).await?;
        }

        for cert in &request.cert_paths {
            self.install_cert_locked(index, cert).await?;
        }

        // proxy settings only apply after a reboot
        let mut reboot_required = false;
        if let Some(ref proxy) = request.proxy {
            self.set_http_proxy_locked(index, proxy).await?;
            reboot_required = true;
        }

        if request.run_after_create {
            if reboot_required {
                info!("Rebooting index {} to apply proxy", index);
                self.console.reboot(index).await?;
                self.wait_android_ready(index, FirstCheck::AfterInterval).await?;
            } else {
                self.ensure_android_ready(index).await?;
            }

            Ok(Instance {
                name: request.name.clone(),
                index,
                running: true,
                android_ready: true,
            })
        } else {
            self.quit_locked(index).await?;

            Ok(Instance {
                name: request.name.clone(),
                index,
                running: false,
                android_ready: false,
            })
        }
    }

    /// Install an apk, booting the instance first if needed
    pub async fn install_apk(&self, index: i32, apk_path: &Path) -> Result<()> {
        let _guard = self.lock(index).await?;
        self.install_apk_locked(index, apk_path).await
    }

    /// Install a CA certificate into the system trust store, booting the
    /// instance first if needed
    pub async fn install_cert(&self, index: i32, cert_path: &Path) -> Result<()> {
        let _guard = self.lock(index).await?;
        self.install_cert_locked(index, cert_path).await
    }

    /// Write the global HTTP proxy settings; they apply after the next reboot
    pub async fn set_http_proxy(&self, index: i32, proxy: &ProxySettings) -> Result<()> {
        let _guard = self.lock(index).await?;
        self.set_http_proxy_locked(index, proxy).await
    }

    /// Launch once and wait until Android reports ready
    pub async fn launch_and_wait_ready(&self, index: i32) -> Result<Instance> {
        self.require(index).await?;
        {
            let _guard = self.lock(index).await?;
            self.launch_locked(index).await?;
        }
        self.reread(index).await
    }

    /// Quit once and wait until the emulator stops running
    pub async fn quit_and_wait(&self, index: i32) -> Result<Instance> {
        self.require(index).await?;
        {
            let _guard = self.lock(index).await?;
            self.quit_locked(index).await?;
        }
        self.reread(index).await
    }

    /// Instance as listed after a wait
    async fn reread(&self, index: i32) -> Result<Instance> {
        let instance = self.get(index).await?.ok_or(LdError::NotFound(index))?;
        info!("Index {} is {}", index, instance.state().as_str());
        Ok(instance)
    }

    /// Listing that retries ldconsole's spurious success without output.
    ///
    /// Only a reply with zero lines is retried; rows that do not parse are
    /// dropped and may leave the listing empty.
    async fn listing(&self) -> Result<Vec<InstanceStatus>> {
        let attempts = self.polling.empty_list_attempts.max(1);
        for attempt in 1..=attempts {
            let lines = self.console.list_lines().await?;
            if !lines.is_empty() {
                return parse_list2(&lines);
            }
            if attempt < attempts {
                warn!("list2 returned no output (attempt {}/{}), retrying", attempt, attempts);
                self.poller
                    .pause("listing", self.polling.empty_list_interval())
                    .await?;
            }
        }

        Err(LdError::domain(format!(
            "list2 returned no output after {} attempts",
            attempts
        )))
    }

    async fn require(&self, index: i32) -> Result<()> {
        if self.listing().await?.iter().any(|s| s.index == index) {
            Ok(())
        } else {
            Err(LdError::NotFound(index))
        }
    }

    async fn lock(&self, index: i32) -> Result<IndexGuard> {
        let cancel = self.poller.cancellation_token();
        tokio::select! {
            _ = cancel.cancelled() => {
                Err(LdError::Interrupted(format!("waiting for index {} was cancelled", index)))
            }
            guard = self.locks.acquire(index) => Ok(guard),
        }
    }

    /// Copy the template and settle the new index.
    ///
    /// The exit code of `copy` is the new index. When verification is on, that
    /// index must be listed afterwards and must not have existed before;
    /// otherwise the single index that appeared during the copy is used.
    async fn copy_template(&self, request: &CreationRequest) -> Result<i32> {
        if !self.creation.verify_copied_index {
            return self.console.copy(&request.name, request.source_index).await;
        }

        let before: Vec<i32> = self.listing().await?.iter().map(|s| s.index).collect();
        let index = self.console.copy(&request.name, request.source_index).await?;
        let after = self.listing().await?;

        if !before.contains(&index) && after.iter().any(|s| s.index == index) {
            return Ok(index);
        }

        let appeared: Vec<&InstanceStatus> =
            after.iter().filter(|s| !before.contains(&s.index)).collect();
        let candidates: Vec<&InstanceStatus> = if appeared.len() > 1 {
            appeared
                .into_iter()
                .filter(|s| s.title == request.name)
                .collect()
        } else {
            appeared
        };

        match candidates.as_slice() {
            [only] => {
                warn!(
                    "copy reported index {} but index {} appeared, using {}",
                    index, only.index, only.index
                );
                Ok(only.index)
            }
            _ => Err(LdError::domain(format!(
                "Fail to locate instance '{}': copy reported index {} which is not a new instance",
                request.name, index
            ))),
        }
    }

    fn ready_spec(&self) -> PollSpec {
        PollSpec::new(self.polling.ready_interval(), self.polling.ready_timeout())
    }

    fn quit_spec(&self) -> PollSpec {
        PollSpec::new(self.polling.quit_interval(), self.polling.quit_timeout())
    }

    async fn wait_android_ready(&self, index: i32, first: FirstCheck) -> Result<()> {
        let what = format!("android ready on index {}", index);
        self.poller
            .until(&what, self.ready_spec(), first, move || self.is_android_ready(index))
            .await?;
        Ok(())
    }

    async fn launch_locked(&self, index: i32) -> Result<()> {
        info!("Launching index {}", index);
        self.console.launch(index).await?;
        self.wait_android_ready(index, FirstCheck::AfterInterval).await?;
        info!("Index {} is android ready", index);
        Ok(())
    }

    async fn quit_locked(&self, index: i32) -> Result<()> {
        info!("Quitting index {}", index);
        self.console.quit(index).await?;
        let what = format!("index {} to stop", index);
        self.poller
            .until(&what, self.quit_spec(), FirstCheck::AfterInterval, move || async move {
                Ok(!self.console.is_running(index).await?)
            })
            .await?;
        info!("Index {} stopped", index);
        Ok(())
    }

    /// Launch if not running, then wait until Android is ready
    async fn ensure_android_ready(&self, index: i32) -> Result<()> {
        if !self.console.is_running(index).await? {
            self.launch_locked(index).await?;
        }
        self.wait_android_ready(index, FirstCheck::Immediate).await
    }

    async fn install_apk_locked(&self, index: i32, apk_path: &Path) -> Result<()> {
        self.ensure_android_ready(index).await?;
        info!("Installing {} to index {}", apk_path.display(), index);
        self.console.install_app(index, apk_path).await
    }

    async fn install_cert_locked(&self, index: i32, cert_path: &Path) -> Result<()> {
        let remote = remote_cert_path(cert_path)?;
        self.ensure_android_ready(index).await?;

        info!("Installing certificate {} to index {}", cert_path.display(), index);
        self.console.push(index, cert_path, &remote).await?;

        let output = self
            .console
            .adb(index, &format!("shell chmod 644 {}", remote))
            .await?;
        if !output.is_empty() {
            debug!("chmod {} on index {}: {}", remote, index, output.join("\n"));
        }
        Ok(())
    }

    async fn set_http_proxy_locked(&self, index: i32, proxy: &ProxySettings) -> Result<()> {
        self.ensure_android_ready(index).await?;

        info!("Setting http proxy {}:{} on index {}", proxy.host, proxy.port, index);
        self.console
            .put_setting(index, GLOBAL_NAMESPACE, PROXY_HOST_KEY, &proxy.host)
            .await?;
        self.console
            .put_setting(index, GLOBAL_NAMESPACE, PROXY_PORT_KEY, &proxy.port.to_string())
            .await?;
        if let Some(exclusions) = proxy.exclusions.as_deref().filter(|e| !e.trim().is_empty()) {
            self.console
                .put_setting(index, GLOBAL_NAMESPACE, PROXY_EXCLUSION_KEY, exclusions)
                .await?;
        }
        Ok(())
    }
}

/// Trust store location for a certificate file, keeping its base name
pub fn remote_cert_path(cert_path: &Path) -> Result<String> {
    let file_name = cert_path.file_name().ok_or_else(|| {
        LdError::domain(format!(
            "Certificate path {} has no file name",
            cert_path.display()
        ))
    })?;
    Ok(format!("{}/{}", CACERTS_DIR, file_name.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use ldfleet_console_bridge::testing::ScriptedRunner;
    use ldfleet_console_bridge::CommandResult;

    const TEMPLATE: &str = "0,LDPlayer,0,0,0,-1,-1";
    const T1_BOOTING: &str = "3,t1,2033,1122,0,4120,5000";
    const T1_READY: &str = "3,t1,2033,1122,1,4120,5000";
    const T1_STOPPED: &str = "3,t1,0,0,0,-1,-1";

    fn list(lines: &[&str]) -> CommandResult {
        CommandResult::lines(0, lines)
    }

    fn running() -> CommandResult {
        CommandResult::lines(0, &["running"])
    }

    fn stopped() -> CommandResult {
        CommandResult::lines(0, &["stop"])
    }

    fn orchestrator(runner: &Arc<ScriptedRunner>) -> Orchestrator {
        let console = LdConsole::new("ldconsole", runner.clone());
        Orchestrator::new(console, &AppConfig::default())
    }

    fn position(calls: &[String], prefix: &str) -> usize {
        calls
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with '{}' in {:?}", prefix, calls))
    }

    #[test]
    fn test_remote_cert_path() {
        assert_eq!(
            remote_cert_path(Path::new("/home/me/certs/c8750f0d.0")).unwrap(),
            "/system/etc/security/cacerts/c8750f0d.0"
        );
        assert!(remote_cert_path(Path::new("/")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_run_after_create_installs_after_ready() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("copy", CommandResult::lines(3, &[]))
            .respond("isrunning", stopped())
            .respond("isrunning", running())
            .respond("launch", CommandResult::ok())
            .respond("installapp", CommandResult::ok());

        let request = CreationRequest::new("t1", 0)
            .run_after_create(true)
            .with_apk("/a.apk");
        let instance = orchestrator(&runner).create(&request).await.unwrap();

        assert_eq!(
            instance,
            Instance {
                name: "t1".to_string(),
                index: 3,
                running: true,
                android_ready: true,
            }
        );
        assert_eq!(
            runner.calls_to("installapp"),
            vec!["installapp --index 3 --filename \"/a.apk\""]
        );
        assert_eq!(runner.count("launch"), 1);

        // the apk goes in only after a listing reported android ready
        let calls = runner.calls();
        let install_at = position(&calls, "installapp");
        let listings_before = calls[..install_at].iter().filter(|c| *c == "list2").count();
        assert!(listings_before >= 4, "{:?}", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_run_ends_with_quit() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("copy", CommandResult::lines(3, &[]))
            .respond("isrunning", running())
            .respond("isrunning", running())
            .respond("isrunning", stopped())
            .respond("adb", CommandResult::ok())
            .respond("quit", CommandResult::ok());

        let request = CreationRequest::new("t1", 0).with_proxy(ProxySettings {
            host: "10.0.0.1".to_string(),
            port: 8888,
            exclusions: Some(".example.com".to_string()),
        });
        let instance = orchestrator(&runner).create(&request).await.unwrap();

        assert!(!instance.running);
        assert!(!instance.android_ready);
        assert_eq!(runner.count("reboot"), 0);
        assert_eq!(runner.count("launch"), 0);

        let calls = runner.calls();
        let quit_at = position(&calls, "quit");
        assert_eq!(calls[quit_at], "quit --index 3");
        // only running checks follow the quit
        assert!(calls[quit_at + 1..].iter().all(|c| c.starts_with("isrunning")));
        assert_eq!(
            runner.calls_to("adb"),
            vec![
                "adb --index 3 --command \"shell settings put global global_http_proxy_host 10.0.0.1\"",
                "adb --index 3 --command \"shell settings put global global_http_proxy_port 8888\"",
                "adb --index 3 --command \"shell settings put global global_http_proxy_exclusion_list .example.com\"",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_run_boots_stopped_instance_for_proxy_then_quits() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", list(&[TEMPLATE, T1_STOPPED]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("copy", CommandResult::lines(3, &[]))
            .respond("isrunning", stopped())
            .respond("launch", CommandResult::ok())
            .respond("adb", CommandResult::ok())
            .respond("quit", CommandResult::ok());

        let request = CreationRequest::new("t1", 0).with_proxy(ProxySettings {
            host: "10.0.0.1".to_string(),
            port: 8888,
            exclusions: None,
        });
        let instance = orchestrator(&runner).create(&request).await.unwrap();

        assert!(!instance.running);
        assert_eq!(runner.calls_to("launch"), vec!["launch --index 3"]);
        assert_eq!(runner.count("reboot"), 0);

        let calls = runner.calls();
        let first_write = position(&calls, "adb");
        let last_write = calls.iter().rposition(|c| c.starts_with("adb")).unwrap();
        assert!(position(&calls, "launch") < first_write);
        assert_eq!(last_write - first_write, 1);
        // after the proxy writes only the quit and its running checks follow
        assert_eq!(calls[last_write + 1], "quit --index 3");
        assert!(calls[last_write + 2..]
            .iter()
            .all(|c| c.starts_with("isrunning")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_proxy_reboots_instead_of_launch() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("copy", CommandResult::lines(3, &[]))
            .respond("isrunning", running())
            .respond("adb", CommandResult::ok())
            .respond("reboot", CommandResult::ok());

        let request = CreationRequest::new("t1", 0)
            .run_after_create(true)
            .with_proxy(ProxySettings {
                host: "proxy.local".to_string(),
                port: 3128,
                exclusions: None,
            });
        let instance = orchestrator(&runner).create(&request).await.unwrap();

        assert!(instance.android_ready);
        assert_eq!(runner.calls_to("reboot"), vec!["reboot --index 3"]);
        assert_eq!(runner.count("launch"), 0);
        assert_eq!(runner.count("quit"), 0);
        // no exclusion list was given
        assert_eq!(runner.count("adb"), 2);

        let calls = runner.calls();
        assert!(position(&calls, "adb") < position(&calls, "reboot"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_modify_then_certificates_in_order() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("copy", CommandResult::lines(3, &[]))
            .respond("modify", CommandResult::ok())
            .respond("isrunning", running())
            .respond("isrunning", running())
            .respond("push", CommandResult::ok())
            .respond("adb", CommandResult::ok())
            .respond("quit", CommandResult::ok())
            .respond("isrunning", stopped());

        let request = CreationRequest::new("t1", 0)
            .with_device(Some("samsung"), Some("SM-G9860"))
            .with_cert("/certs/a.0")
            .with_cert("/certs/b.0");
        orchestrator(&runner).create(&request).await.unwrap();

        let calls = runner.calls();
        assert!(position(&calls, "modify") < position(&calls, "push"));
        assert_eq!(
            runner.calls_to("modify"),
            vec!["modify --index 3 --manufacturer samsung --model SM-G9860"]
        );
        assert_eq!(
            runner.calls_to("push"),
            vec![
                "push --index 3 --remote \"/system/etc/security/cacerts/a.0\" --local \"/certs/a.0\"",
                "push --index 3 --remote \"/system/etc/security/cacerts/b.0\" --local \"/certs/b.0\"",
            ]
        );
        assert_eq!(
            runner.calls_to("adb"),
            vec![
                "adb --index 3 --command \"shell chmod 644 /system/etc/security/cacerts/a.0\"",
                "adb --index 3 --command \"shell chmod 644 /system/etc/security/cacerts/b.0\"",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_stops_remaining_steps() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("copy", CommandResult::lines(3, &[]))
            .respond("isrunning", running())
            .respond("installapp", CommandResult::lines(0, &["Failure [INSTALL_FAILED]"]));

        let request = CreationRequest::new("t1", 0)
            .run_after_create(true)
            .with_apk("/a.apk")
            .with_apk("/b.apk")
            .with_cert("/c.0");
        let err = orchestrator(&runner).create(&request).await.unwrap_err();

        assert!(matches!(err, LdError::Domain { .. }));
        assert_eq!(runner.count("installapp"), 1);
        assert_eq!(runner.count("push"), 0);
        assert_eq!(runner.count("quit"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_index_falls_back_to_listing_diff() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE, "1,old,0,0,0,-1,-1"]))
            .respond(
                "list2",
                list(&[TEMPLATE, "1,old,0,0,0,-1,-1", "4,t1,0,0,0,-1,-1"]),
            )
            .respond("copy", CommandResult::lines(9, &[]))
            .respond("quit", CommandResult::ok())
            .respond("isrunning", stopped());

        let instance = orchestrator(&runner)
            .create(&CreationRequest::new("t1", 0))
            .await
            .unwrap();

        assert_eq!(instance.index, 4);
        assert_eq!(runner.calls_to("quit"), vec!["quit --index 4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_exit_naming_existing_index_is_not_trusted() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", list(&[TEMPLATE, "4,t1,0,0,0,-1,-1"]))
            .respond("copy", CommandResult::lines(0, &[]))
            .respond("modify", CommandResult::ok())
            .respond("quit", CommandResult::ok())
            .respond("isrunning", stopped());

        let request = CreationRequest::new("t1", 0).with_device(Some("samsung"), None);
        let instance = orchestrator(&runner).create(&request).await.unwrap();

        assert_eq!(instance.index, 4);
        assert_eq!(
            runner.calls_to("modify"),
            vec!["modify --index 4 --manufacturer samsung"]
        );
        assert_eq!(runner.calls_to("quit"), vec!["quit --index 4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_index_unresolvable() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("copy", CommandResult::lines(9, &[]));

        let err = orchestrator(&runner)
            .create(&CreationRequest::new("t1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LdError::Domain { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_trusted_without_verification() {
        let runner = ScriptedRunner::new();
        runner
            .respond("copy", CommandResult::lines(7, &[]))
            .respond("quit", CommandResult::ok())
            .respond("isrunning", stopped());

        let mut config = AppConfig::default();
        config.creation.verify_copied_index = false;
        let console = LdConsole::new("ldconsole", runner.clone());
        let instance = Orchestrator::new(console, &config)
            .create(&CreationRequest::new("t7", 0))
            .await
            .unwrap();

        assert_eq!(instance.index, 7);
        assert_eq!(runner.count("list2"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_and_wait_ready_launches_once() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE, T1_STOPPED]))
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("launch", CommandResult::ok())
            .respond("isrunning", running());

        let started = tokio::time::Instant::now();
        let instance = orchestrator(&runner).launch_and_wait_ready(3).await.unwrap();

        assert!(instance.running);
        assert!(instance.android_ready);
        assert_eq!(runner.calls_to("launch"), vec!["launch --index 3"]);
        // four ready checks, each after a 10s interval
        assert_eq!(started.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_unknown_index_is_not_found() {
        let runner = ScriptedRunner::new();
        runner.respond("list2", list(&[TEMPLATE]));

        let err = orchestrator(&runner).launch_and_wait_ready(3).await.unwrap_err();
        assert!(matches!(err, LdError::NotFound(3)));
        assert_eq!(runner.count("launch"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_ready_deadline() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("launch", CommandResult::ok());

        let mut config = AppConfig::default();
        config.polling.ready_timeout_secs = Some(60);
        let console = LdConsole::new("ldconsole", runner.clone());
        let err = Orchestrator::new(console, &config)
            .launch_and_wait_ready(3)
            .await
            .unwrap_err();

        assert!(matches!(err, LdError::WaitTimeout(_)));
        assert_eq!(runner.count("launch"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_boot_wait() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("launch", CommandResult::ok());

        let token = CancellationToken::new();
        let orchestrator = orchestrator(&runner).with_cancellation(token.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            token.cancel();
        });

        let err = orchestrator.launch_and_wait_ready(3).await.unwrap_err();
        assert!(matches!(err, LdError::Interrupted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_and_wait_polls_until_stopped() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("quit", CommandResult::ok())
            .respond("isrunning", running())
            .respond("isrunning", stopped());

        let started = tokio::time::Instant::now();
        let instance = orchestrator(&runner).quit_and_wait(3).await.unwrap();

        assert!(!instance.running);
        assert_eq!(runner.calls_to("quit"), vec!["quit --index 3"]);
        // two running checks after quit, each after a 5s interval, then one from get()
        assert_eq!(runner.count("isrunning"), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_all_retries_empty_listing() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("isrunning", stopped())
            .respond("isrunning", running());

        let instances = orchestrator(&runner).get_all().await.unwrap();

        assert_eq!(runner.count("list2"), 2);
        assert_eq!(
            instances,
            vec![
                Instance {
                    name: "LDPlayer".to_string(),
                    index: 0,
                    running: false,
                    android_ready: false,
                },
                Instance {
                    name: "t1".to_string(),
                    index: 3,
                    running: true,
                    android_ready: true,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_listing_retry_is_capped() {
        let runner = ScriptedRunner::new();
        runner.respond("list2", list(&[]));

        let err = orchestrator(&runner).get_all().await.unwrap_err();
        assert!(matches!(err, LdError::Domain { .. }));
        assert_eq!(runner.count("list2"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_only_listing_is_not_retried() {
        let runner = ScriptedRunner::new();
        runner.respond("list2", list(&["partial,row"]));
        let orchestrator = orchestrator(&runner);

        assert_eq!(orchestrator.get(3).await.unwrap(), None);
        assert_eq!(runner.count("list2"), 1);
        assert!(orchestrator.get_all().await.unwrap().is_empty());
        assert_eq!(runner.count("list2"), 2);
        assert_eq!(runner.count("isrunning"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_missing_and_list_failure() {
        let runner = ScriptedRunner::new();
        runner
            .respond("list2", list(&[TEMPLATE]))
            .respond("list2", CommandResult::lines(1, &[]));
        let orchestrator = orchestrator(&runner);

        assert_eq!(orchestrator.get(3).await.unwrap(), None);
        assert_eq!(runner.count("isrunning"), 0);

        let err = orchestrator.get(3).await.unwrap_err();
        assert_eq!(err.to_string(), "list failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_apk_launches_stopped_instance() {
        let runner = ScriptedRunner::new();
        runner
            .respond("isrunning", stopped())
            .respond("launch", CommandResult::ok())
            .respond("list2", list(&[TEMPLATE, T1_BOOTING]))
            .respond("list2", list(&[TEMPLATE, T1_READY]))
            .respond("installapp", CommandResult::ok());

        orchestrator(&runner)
            .install_apk(3, &PathBuf::from("/b.apk"))
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0], "isrunning --index 3");
        assert_eq!(calls[1], "launch --index 3");
        assert_eq!(
            calls.last().map(String::as_str),
            Some("installapp --index 3 --filename \"/b.apk\"")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_failure_propagates() {
        let runner = ScriptedRunner::new();
        runner.fail("list2", LdError::execution("ldconsole list2", "not found"));

        let err = orchestrator(&runner).get_all().await.unwrap_err();
        assert!(matches!(err, LdError::Execution { .. }));
    }
}
