//! Git identity materialisation from a single-use template.
//!
//! The provisioning image drops a template carrying `{{proxy}}`, `{{email}}`
//! and `{{name}}` placeholders. The first successful run renders it into the
//! user's git configuration and deletes it, so later runs are inert.

use crate::config::GitIdentityConfig;
use crate::env::RunnerEnv;
use crate::error::{RunnerError, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// Result of a configure request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// No template was present; nothing was written.
    Skipped,
    /// The identity file was written and the template removed.
    Written {
        /// The generated identity file.
        path: Utf8PathBuf,
    },
}

/// Inputs for one materialisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentityTemplate {
    /// The single-use template.
    pub template: Utf8PathBuf,
    /// The identity file to write.
    pub output: Utf8PathBuf,
    /// Proxy server substituted for `{{proxy}}`.
    pub proxy: Option<String>,
    /// Display name substituted for `{{name}}`.
    pub name: Option<String>,
    /// Email substituted for `{{email}}`.
    pub email: Option<String>,
}

impl GitIdentityTemplate {
    /// Resolves the default template from configuration and environment.
    #[must_use]
    pub fn from_env(env: &RunnerEnv, config: &GitIdentityConfig) -> Self {
        Self {
            template: env.home.join(&config.template),
            output: env.home.join(&config.output),
            proxy: env.proxy.clone(),
            name: env.full_name.clone(),
            email: env.email.clone(),
        }
    }

    /// Renders the template into the identity file and deletes the template.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] before touching any file when the
    /// proxy is unknown, and [`RunnerError::Generation`] when the template
    /// cannot be read or removed or the output written. A missing name or
    /// email renders as an empty value.
    pub fn configure(&self) -> Result<IdentityOutcome> {
        let proxy = required(self.proxy.as_deref(), "no proxy server is configured")?;

        if !self.template.exists() {
            log::debug!("no git identity template at {}", self.template);
            return Ok(IdentityOutcome::Skipped);
        }

        let name = optional(self.name.as_deref(), "display name");
        let email = optional(self.email.as_deref(), "email");

        let text = std::fs::read_to_string(&self.template)
            .map_err(|e| generation_error(&self.template, &e))?;
        let rendered = render(&text, proxy, name, email);

        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| generation_error(&self.output, &e))?;
        }
        std::fs::write(&self.output, rendered).map_err(|e| generation_error(&self.output, &e))?;
        std::fs::remove_file(&self.template).map_err(|e| generation_error(&self.template, &e))?;

        log::info!("wrote git identity to {}", self.output);
        Ok(IdentityOutcome::Written {
            path: self.output.clone(),
        })
    }
}

/// Materialises the default template, logging instead of failing.
///
/// Used by the credential gate, where a missing identity must not block
/// authentication.
pub fn configure_best_effort(env: &RunnerEnv, config: &GitIdentityConfig) {
    if let Err(err) = GitIdentityTemplate::from_env(env, config).configure() {
        log::warn!("git identity not configured: {err}");
    }
}

/// Substitutes the three placeholders.
///
/// # Examples
///
/// ```
/// use imcv2_sdk_runner::git_identity::render;
///
/// let out = render("proxy = {{proxy}}\n{{name}} <{{email}}>", "http://p:911", "Jo", "jo@x");
/// assert_eq!(out, "proxy = http://p:911\nJo <jo@x>");
/// ```
#[must_use]
pub fn render(template: &str, proxy: &str, name: &str, email: &str) -> String {
    template
        .replace("{{proxy}}", proxy)
        .replace("{{email}}", email)
        .replace("{{name}}", name)
}

fn required<'a>(value: Option<&'a str>, reason: &str) -> Result<&'a str> {
    value.ok_or_else(|| RunnerError::Config {
        reason: reason.to_owned(),
    })
}

fn optional<'a>(value: Option<&'a str>, what: &str) -> &'a str {
    value.unwrap_or_else(|| {
        log::warn!("git {what} is not set; leaving it empty");
        ""
    })
}

fn generation_error(path: &Utf8Path, err: &std::io::Error) -> RunnerError {
    RunnerError::Generation {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const TEMPLATE: &str = "[http]\n\tproxy = {{proxy}}\n[user]\n\tname = {{name}}\n\temail = {{email}}\n";

    struct Home {
        _temp: tempfile::TempDir,
        root: Utf8PathBuf,
    }

    impl Home {
        fn template(&self) -> GitIdentityTemplate {
            GitIdentityTemplate {
                template: self.root.join(".imcv2/imcv2_git_config.template"),
                output: self.root.join(".gitconfig"),
                proxy: Some("http://proxy-dmz.intel.com:911".to_owned()),
                name: Some("Jane Doe".to_owned()),
                email: Some("jane.doe@intel.com".to_owned()),
            }
        }

        fn write_template(&self) {
            let template = self.template().template;
            std::fs::create_dir_all(template.parent().expect("parent")).expect("template dir");
            std::fs::write(template, TEMPLATE).expect("write template");
        }
    }

    #[fixture]
    fn home() -> Home {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        Home { _temp: temp, root }
    }

    #[rstest]
    fn missing_template_performs_no_writes(home: Home) {
        let outcome = home.template().configure().expect("inert");
        assert_eq!(outcome, IdentityOutcome::Skipped);
        assert!(!home.root.join(".gitconfig").exists());
    }

    #[rstest]
    fn missing_proxy_is_a_config_error(home: Home) {
        home.write_template();
        let template = GitIdentityTemplate {
            proxy: None,
            ..home.template()
        };

        let err = template.configure().expect_err("no proxy");

        assert!(matches!(err, RunnerError::Config { .. }));
        assert!(template.template.exists());
        assert!(!template.output.exists());
    }

    #[rstest]
    fn renders_output_and_deletes_template(home: Home) {
        home.write_template();
        std::fs::write(home.root.join(".gitconfig"), "stale").expect("prior config");
        let template = home.template();

        let outcome = template.configure().expect("written");

        assert_eq!(
            outcome,
            IdentityOutcome::Written {
                path: template.output.clone()
            }
        );
        let written = std::fs::read_to_string(&template.output).expect("read output");
        assert!(written.contains("proxy = http://proxy-dmz.intel.com:911"));
        assert!(written.contains("name = Jane Doe"));
        assert!(written.contains("email = jane.doe@intel.com"));
        assert!(!template.template.exists());
    }

    #[rstest]
    fn second_run_is_inert(home: Home) {
        home.write_template();
        let template = home.template();
        template.configure().expect("first run");
        assert_eq!(template.configure().expect("second run"), IdentityOutcome::Skipped);
    }

    #[rstest]
    fn missing_email_renders_empty_and_consumes_template(home: Home) {
        home.write_template();
        let template = GitIdentityTemplate {
            email: None,
            ..home.template()
        };

        let outcome = template.configure().expect("written without email");

        assert!(matches!(outcome, IdentityOutcome::Written { .. }));
        let written = std::fs::read_to_string(&template.output).expect("read output");
        assert!(written.contains("name = Jane Doe"));
        assert!(!written.contains("{{email}}"));
        assert!(!template.template.exists());
    }
}
