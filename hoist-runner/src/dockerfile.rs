//! Dockerfile rendering and inspection
//!
//! When a source snapshot ships without a Dockerfile the builder renders a
//! two-stage one. The first stage copies only the dependency manifests and
//! installs from them, so the dependency layer is cached until the manifests
//! change; the runtime stage then copies the installed modules and the full
//! source. An ignore file written next to it keeps host-installed modules out
//! of the build context.

/// Paths never sent to the build of a generated Dockerfile
pub const IGNORED_PATHS: [&str; 3] = ["node_modules", ".git", "npm-debug.log"];

/// Template for the generated two-stage Dockerfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerfileTemplate {
    /// Base image for both stages (pinned tag keeps builds repeatable)
    pub base_image: String,

    /// Files copied into the dependency stage before installing
    pub manifests: Vec<String>,

    /// Dependency installation command run in the first stage
    pub install: String,

    /// Port the application listens on
    pub port: u16,

    /// Container start command (exec form)
    pub start: Vec<String>,
}

impl DockerfileTemplate {
    /// Template for a Node.js service listening on `port`
    pub fn node(port: u16) -> Self {
        Self {
            base_image: "node:18-alpine".to_string(),
            manifests: vec!["package.json".to_string(), "package-lock.json*".to_string()],
            install: "npm install --omit=dev".to_string(),
            port,
            start: vec!["npm".to_string(), "start".to_string()],
        }
    }

    /// Renders the Dockerfile
    ///
    /// Output depends only on the template fields.
    pub fn render(&self) -> String {
        let start = self
            .start
            .iter()
            .map(|s| format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "# syntax=docker/dockerfile:1\n\
             FROM {base} AS deps\n\
             WORKDIR /app\n\
             COPY {manifests} ./\n\
             RUN {install}\n\
             \n\
             FROM {base}\n\
             WORKDIR /app\n\
             ENV NODE_ENV=production\n\
             ENV PORT={port}\n\
             COPY --from=deps /app/node_modules ./node_modules\n\
             COPY . .\n\
             EXPOSE {port}\n\
             CMD [{start}]\n",
            base = self.base_image,
            manifests = self.manifests.join(" "),
            install = self.install,
            port = self.port,
            start = start,
        )
    }
}

/// Renders the ignore file for a generated Dockerfile
///
/// Starts with [`IGNORED_PATHS`] and keeps the patterns of the source's own
/// `.dockerignore`, if any.
pub fn render_ignore(existing: Option<&str>) -> String {
    let mut lines: Vec<&str> = IGNORED_PATHS.to_vec();
    for pattern in existing.unwrap_or_default().lines().map(str::trim) {
        if !pattern.is_empty() && !pattern.starts_with('#') && !lines.contains(&pattern) {
            lines.push(pattern);
        }
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

/// Checks that dependencies are installed before the full source is copied
///
/// Looks for the first `RUN` mentioning an install and the first `COPY`
/// of the whole build context (`COPY . <dest>`). Returns `true` when the
/// install comes first or when the file never copies the whole context.
pub fn installs_before_source_copy(dockerfile: &str) -> bool {
    let mut install_line = None;
    let mut source_copy_line = None;

    for (idx, line) in dockerfile.lines().enumerate() {
        let line = line.trim();
        let upper = line.to_ascii_uppercase();

        if install_line.is_none() && upper.starts_with("RUN ") && is_install(line) {
            install_line = Some(idx);
        }

        if source_copy_line.is_none() && upper.starts_with("COPY ") && copies_context(line) {
            source_copy_line = Some(idx);
        }
    }

    match (install_line, source_copy_line) {
        (_, None) => true,
        (Some(install), Some(copy)) => install < copy,
        (None, Some(_)) => false,
    }
}

fn is_install(run: &str) -> bool {
    const MARKERS: [&str; 6] = [
        "npm ci",
        "npm install",
        "yarn install",
        "pnpm install",
        "pip install",
        "cargo fetch",
    ];
    MARKERS.iter().any(|m| run.contains(m))
}

fn copies_context(copy: &str) -> bool {
    let sources: Vec<&str> = copy
        .split_whitespace()
        .skip(1)
        .filter(|arg| !arg.starts_with("--"))
        .collect();

    // Last argument is the destination
    sources.len() >= 2 && sources[..sources.len() - 1].iter().any(|s| *s == "." || *s == "./")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_deterministic() {
        let template = DockerfileTemplate::node(3033);
        assert_eq!(template.render(), template.render());
        assert_eq!(template.render(), DockerfileTemplate::node(3033).render());
    }

    #[test]
    fn test_render_layers_dependencies_first() {
        let rendered = DockerfileTemplate::node(3033).render();
        assert!(rendered.contains("EXPOSE 3033"));
        assert!(rendered.contains("ENV PORT=3033"));
        assert!(rendered.contains("CMD [\"npm\", \"start\"]"));
        assert!(installs_before_source_copy(&rendered));
    }

    #[test]
    fn test_ignore_keeps_host_modules_out() {
        let rendered = render_ignore(None);
        assert_eq!(rendered, "node_modules\n.git\nnpm-debug.log\n");
    }

    #[test]
    fn test_ignore_merges_source_patterns() {
        let rendered = render_ignore(Some("# local\ncoverage\nnode_modules\n\n.env\n"));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, ["node_modules", ".git", "npm-debug.log", "coverage", ".env"]);
    }

    #[test]
    fn test_source_copied_before_install_is_detected() {
        let dockerfile = "FROM node:18\nWORKDIR /app\nCOPY . .\nRUN npm install\nCMD [\"node\", \"index.js\"]\n";
        assert!(!installs_before_source_copy(dockerfile));
    }

    #[test]
    fn test_copy_from_stage_is_not_a_context_copy() {
        let dockerfile = "FROM node:18\nCOPY --from=deps /app/node_modules ./node_modules\n";
        assert!(installs_before_source_copy(dockerfile));
    }

    #[test]
    fn test_manifest_copy_then_install_then_source() {
        let dockerfile = "FROM node:18\nCOPY package*.json ./\nRUN npm ci\nCOPY . .\n";
        assert!(installs_before_source_copy(dockerfile));
    }
}
