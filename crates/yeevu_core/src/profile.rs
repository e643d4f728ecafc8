//! Generation profiles.
//!
//! A profile bundles the brief template, the tool allowlist and the list of
//! required files. There is one generation pipeline; profiles only vary its
//! configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tools::ToolName;
use crate::validation::{FileCheck, RequiredFile};

/// Available profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Three files, Write tool only
    Minimal,
    /// TypeScript + Tailwind project with the full tool set
    #[default]
    Tailwind,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::Tailwind => write!(f, "tailwind"),
        }
    }
}

impl FromStr for ProfileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "tailwind" => Ok(Self::Tailwind),
            other => Err(format!(
                "Unknown profile '{}'. Expected 'minimal' or 'tailwind'",
                other
            )),
        }
    }
}

/// Configuration of one generation run.
#[derive(Debug, Clone)]
pub struct GenerationProfile {
    pub kind: ProfileKind,
    pub allowed_tools: Vec<ToolName>,
    pub required_files: Vec<RequiredFile>,
    pub max_turns: u32,
}

impl GenerationProfile {
    pub fn minimal() -> Self {
        Self {
            kind: ProfileKind::Minimal,
            allowed_tools: vec![ToolName::Write],
            required_files: vec![
                RequiredFile::new("package.json", FileCheck::manifest("next")),
                RequiredFile::new("app/layout.tsx", FileCheck::default_export()),
                RequiredFile::new("app/page.tsx", FileCheck::default_export()),
            ],
            max_turns: 10,
        }
    }

    pub fn tailwind() -> Self {
        Self {
            kind: ProfileKind::Tailwind,
            allowed_tools: ToolName::ALL.to_vec(),
            required_files: vec![
                RequiredFile::new("package.json", FileCheck::manifest("next")),
                RequiredFile::new("next.config.js", FileCheck::config_export()),
                RequiredFile::new("tailwind.config.js", FileCheck::config_export()),
                RequiredFile::new("postcss.config.js", FileCheck::config_export()),
                RequiredFile::new("tsconfig.json", FileCheck::json_object("compilerOptions")),
                RequiredFile::new("app/globals.css", FileCheck::NonEmpty),
                RequiredFile::new("app/layout.tsx", FileCheck::default_export()),
                RequiredFile::new("app/page.tsx", FileCheck::default_export()),
            ],
            max_turns: 20,
        }
    }

    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Minimal => Self::minimal(),
            ProfileKind::Tailwind => Self::tailwind(),
        }
    }

    /// Override the turn budget.
    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn requires(&self, path: &str) -> bool {
        self.required_files.iter().any(|f| f.path == path)
    }

    /// Initial user message for the conversation.
    pub fn brief(&self, prompt: &str) -> String {
        let prompt = prompt.trim();
        match self.kind {
            ProfileKind::Minimal => format!(
                "Create a Next.js website about: {prompt}\n\n\
                 Create these 3 files:\n\n\
                 1. package.json - Standard Next.js package.json with next, react, react-dom dependencies and dev/build/start scripts\n\n\
                 2. app/layout.tsx - Root layout wrapping children in <html> and <body> tags\n\n\
                 3. app/page.tsx - Homepage component with content about \"{prompt}\". Use clear HTML structure and inline styles where needed.\n\n\
                 Use the Write tool to create all 3 files with complete, working code. Make the content relevant to the topic.",
                prompt = prompt
            ),
            ProfileKind::Tailwind => {
                let files: Vec<String> = self
                    .required_files
                    .iter()
                    .enumerate()
                    .map(|(i, f)| format!("{}. {}", i + 1, f.path))
                    .collect();
                format!(
                    "You are creating a complete Next.js website in an EMPTY project directory.\n\n\
                     USER REQUEST: {prompt}\n\n\
                     Build it as a Next.js 14 App Router project with TypeScript and Tailwind CSS.\n\n\
                     You MUST create ALL of these files (paths are relative to the project root):\n\
                     {files}\n\n\
                     Requirements:\n\
                     - package.json lists next, react, react-dom, typescript, tailwindcss, postcss and autoprefixer, with dev/build/start scripts\n\
                     - Config files export their configuration (module.exports)\n\
                     - app/globals.css starts with the Tailwind directives\n\
                     - app/layout.tsx imports ./globals.css and default-exports the root layout\n\
                     - app/page.tsx default-exports the homepage\n\
                     - Write real, specific content about the request; no lorem ipsum\n\
                     - Do not run npm install or start a server; that happens after you finish\n\n\
                     Start with package.json, then create every other file. Do not assume any file exists.",
                    prompt = prompt,
                    files = files.join("\n")
                )
            }
        }
    }
}

impl Default for GenerationProfile {
    fn default() -> Self {
        Self::tailwind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_kind_parsing() {
        assert_eq!("minimal".parse::<ProfileKind>().unwrap(), ProfileKind::Minimal);
        assert_eq!("Tailwind".parse::<ProfileKind>().unwrap(), ProfileKind::Tailwind);
        assert!("vue".parse::<ProfileKind>().is_err());
        assert_eq!(ProfileKind::default(), ProfileKind::Tailwind);
    }

    #[test]
    fn test_profiles() {
        let minimal = GenerationProfile::minimal();
        assert_eq!(minimal.allowed_tools, vec![ToolName::Write]);
        assert_eq!(minimal.required_files.len(), 3);
        assert!(minimal.requires("app/page.tsx"));
        assert!(!minimal.requires("app/globals.css"));

        let tailwind = GenerationProfile::tailwind();
        assert_eq!(tailwind.allowed_tools.len(), 6);
        assert_eq!(tailwind.required_files.len(), 8);
        assert_eq!(tailwind.max_turns, 20);
        assert_eq!(GenerationProfile::minimal().max_turns(0).max_turns, 1);
    }

    #[test]
    fn test_brief_mentions_prompt_and_files() {
        let brief = GenerationProfile::tailwind().brief("  portfolio site ");
        assert!(brief.contains("USER REQUEST: portfolio site\n"));
        assert!(brief.contains("8. app/page.tsx"));

        let brief = GenerationProfile::minimal().brief("bakery");
        assert!(brief.contains("website about: bakery"));
        assert!(brief.contains("Write tool"));
    }
}
