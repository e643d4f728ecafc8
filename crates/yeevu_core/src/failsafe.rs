//! Deterministic fallbacks for required files.
//!
//! After generation, every required file that is missing or fails its check is
//! replaced with a fixed template. Templates depend only on the user prompt,
//! so running the stage twice leaves the tree unchanged.

use std::sync::Arc;

use tracing::{info, warn};
use yeevu_sandbox::Sandbox;

use crate::error::PipelineResult;
use crate::events::EventSink;
use crate::profile::GenerationProfile;
use crate::validation::{validate_project, ValidationReport};

/// Result of the validation and repair stage.
#[derive(Debug, Clone)]
pub struct FailsafeOutcome {
    /// Report before any repair
    pub before: ValidationReport,
    /// Report after repair
    pub after: ValidationReport,
    /// Files replaced with a fallback, in required-file order
    pub repaired: Vec<String>,
}

/// Fallback content for a required file.
///
/// `with_stylesheet` controls whether the layout imports `./globals.css`.
pub fn fallback_content(path: &str, prompt: &str, with_stylesheet: bool) -> Option<String> {
    let content = match path {
        "package.json" => PACKAGE_JSON.to_string(),
        "next.config.js" => NEXT_CONFIG.to_string(),
        "tailwind.config.js" => TAILWIND_CONFIG.to_string(),
        "postcss.config.js" => POSTCSS_CONFIG.to_string(),
        "tsconfig.json" => TSCONFIG.to_string(),
        "app/globals.css" => GLOBALS_CSS.to_string(),
        "app/layout.tsx" => layout(with_stylesheet),
        "app/page.tsx" => page(prompt),
        _ => return None,
    };
    Some(content)
}

fn layout(with_stylesheet: bool) -> String {
    let import = if with_stylesheet {
        "import './globals.css';\n\n"
    } else {
        ""
    };
    format!(
        "{import}export const metadata = {{\n  title: 'Yeevu Site',\n}};\n\n\
         export default function RootLayout({{ children }}: {{ children: React.ReactNode }}) {{\n  \
         return (\n    <html lang=\"en\">\n      <body>{{children}}</body>\n    </html>\n  );\n}}\n",
        import = import
    )
}

fn page(prompt: &str) -> String {
    let prompt = prompt.trim();
    let prompt = if prompt.is_empty() { "Your website" } else { prompt };
    // A JSON string literal is a valid JS string literal
    let literal = serde_json::to_string(prompt).unwrap_or_else(|_| "\"Your website\"".to_string());
    format!(
        "const prompt = {literal};\n\n\
         export default function Home() {{\n  \
         return (\n    \
         <main className=\"flex flex-col items-center justify-center min-h-screen bg-gray-100 text-gray-900\" \
         style={{{{ fontFamily: 'system-ui, sans-serif', padding: '2rem' }}}}>\n      \
         <h1 className=\"text-4xl font-bold text-center\">Your site is almost ready</h1>\n      \
         <p className=\"mt-4 text-xl text-center max-w-2xl\">\n        \
         A basic site was created based on your prompt:\n        <br />\n        \
         <span className=\"font-semibold text-blue-600\">{{prompt}}</span>\n      \
         </p>\n    </main>\n  );\n}}\n",
        literal = literal
    )
}

const PACKAGE_JSON: &str = r#"{
  "name": "website-project",
  "version": "0.1.0",
  "private": true,
  "scripts": {
    "dev": "next dev",
    "build": "next build",
    "start": "next start"
  },
  "dependencies": {
    "next": "14.2.5",
    "react": "18.3.1",
    "react-dom": "18.3.1"
  },
  "devDependencies": {
    "@types/node": "20.14.10",
    "@types/react": "18.3.3",
    "autoprefixer": "10.4.19",
    "postcss": "8.4.39",
    "tailwindcss": "3.4.6",
    "typescript": "5.5.3"
  }
}
"#;

const NEXT_CONFIG: &str = "/** @type {import('next').NextConfig} */
const nextConfig = {};

module.exports = nextConfig;
";

const TAILWIND_CONFIG: &str = "/** @type {import('tailwindcss').Config} */
module.exports = {
  content: [
    './pages/**/*.{js,ts,jsx,tsx,mdx}',
    './components/**/*.{js,ts,jsx,tsx,mdx}',
    './app/**/*.{js,ts,jsx,tsx,mdx}',
  ],
  theme: {
    extend: {},
  },
  plugins: [],
};
";

const POSTCSS_CONFIG: &str = "module.exports = {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
};
";

const TSCONFIG: &str = r#"{
  "compilerOptions": {
    "target": "es2017",
    "lib": ["dom", "dom.iterable", "esnext"],
    "allowJs": true,
    "skipLibCheck": true,
    "strict": false,
    "forceConsistentCasingInFileNames": true,
    "noEmit": true,
    "incremental": true,
    "esModuleInterop": true,
    "module": "esnext",
    "resolveJsonModule": true,
    "isolatedModules": true,
    "jsx": "preserve",
    "moduleResolution": "node",
    "baseUrl": ".",
    "paths": {
      "@/*": ["./*"]
    }
  },
  "include": ["next-env.d.ts", "**/*.ts", "**/*.tsx"],
  "exclude": ["node_modules"]
}
"#;

const GLOBALS_CSS: &str = "@tailwind base;
@tailwind components;
@tailwind utilities;
";

/// Validate the required files and replace every failing one.
pub async fn apply_failsafe(
    sandbox: &Arc<dyn Sandbox>,
    project_dir: &str,
    profile: &GenerationProfile,
    prompt: &str,
    sink: &EventSink,
) -> PipelineResult<FailsafeOutcome> {
    let before = validate_project(sandbox, project_dir, &profile.required_files).await?;
    let with_stylesheet = profile.requires("app/globals.css");
    let mut repaired = Vec::new();

    for file in before.failing() {
        let Some(content) = fallback_content(&file.path, prompt, with_stylesheet) else {
            warn!("No fallback template for {}", file.path);
            continue;
        };
        let reason = if file.exists { "invalid" } else { "missing" };
        sink.progress(format!(
            "Fixing {}: {} content, applying failsafe",
            file.path, reason
        ))
        .await;

        let path = format!("{}/{}", project_dir.trim_end_matches('/'), file.path);
        sandbox.upload_file(&path, content.as_bytes()).await?;
        repaired.push(file.path.clone());
    }

    let after = if repaired.is_empty() {
        before.clone()
    } else {
        validate_project(sandbox, project_dir, &profile.required_files).await?
    };

    info!(
        "Validation complete: {} of {} files repaired",
        repaired.len(),
        before.files.len()
    );
    let checked = after.files.len();
    let passing = after.files.iter().filter(|f| f.passed()).count();
    if passing == checked {
        sink.progress(format!(
            "All {} required files are present and valid",
            checked
        ))
        .await;
    } else {
        warn!("{} required files still fail validation", checked - passing);
        sink.progress(format!(
            "{} of {} required files are present and valid",
            passing, checked
        ))
        .await;
    }

    Ok(FailsafeOutcome {
        before,
        after,
        repaired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ProgressEvent;
    use crate::validation::{FileCheck, RequiredFile};
    use yeevu_sandbox::MockSandbox;

    #[test]
    fn test_every_fallback_passes_its_check() {
        for profile in [GenerationProfile::tailwind(), GenerationProfile::minimal()] {
            let with_stylesheet = profile.requires("app/globals.css");
            for RequiredFile { path, check } in &profile.required_files {
                let content = fallback_content(path, "portfolio site", with_stylesheet).unwrap();
                assert!(check.check(&content), "fallback for {} fails its check", path);
            }
        }
    }

    #[test]
    fn test_page_embeds_prompt_as_literal() {
        let content = fallback_content("app/page.tsx", "Bob's \"best\" bakery", true).unwrap();
        assert!(content.starts_with(r#"const prompt = "Bob's \"best\" bakery";"#));

        let content = fallback_content("app/page.tsx", "   ", true).unwrap();
        assert!(content.contains("\"Your website\""));
    }

    #[test]
    fn test_layout_stylesheet_import() {
        assert!(layout(true).starts_with("import './globals.css';"));
        assert!(!layout(false).contains("globals.css"));
        assert!(fallback_content("app/about/page.tsx", "x", true).is_none());
    }

    #[tokio::test]
    async fn test_failsafe_repairs_only_failing_files() {
        let mock = MockSandbox::default()
            .with_file("/p/package.json", r#"{"dependencies":{"next":"14"}}"#)
            .with_file("/p/app/layout.tsx", "")
            .with_file("/p/app/about/page.tsx", "custom");
        let sandbox: Arc<dyn Sandbox> = Arc::new(mock.clone());
        let (sink, _rx) = EventSink::channel(64);

        let outcome = apply_failsafe(
            &sandbox,
            "/p",
            &GenerationProfile::minimal(),
            "portfolio site",
            &sink,
        )
        .await
        .unwrap();

        assert_eq!(outcome.repaired, vec!["app/layout.tsx", "app/page.tsx"]);
        assert!(!outcome.before.is_valid());
        assert!(outcome.after.is_valid());
        assert_eq!(
            mock.file("/p/package.json").as_deref(),
            Some(r#"{"dependencies":{"next":"14"}}"#)
        );
        assert_eq!(mock.file("/p/app/about/page.tsx").as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn test_summary_counts_checked_files() {
        let mut profile = GenerationProfile::minimal();
        profile
            .required_files
            .push(RequiredFile::new("app/about/page.tsx", FileCheck::default_export()));
        let sandbox: Arc<dyn Sandbox> = Arc::new(MockSandbox::default());
        let (sink, mut rx) = EventSink::channel(64);

        let outcome = apply_failsafe(&sandbox, "/p", &profile, "bakery", &sink)
            .await
            .unwrap();
        drop(sink);

        assert_eq!(outcome.repaired.len(), 3);
        assert!(!outcome.after.is_valid());
        let mut last = None;
        while let Some(event) = rx.recv().await {
            if let ProgressEvent::Progress { message } = event {
                last = Some(message);
            }
        }
        assert_eq!(
            last.as_deref(),
            Some("3 of 4 required files are present and valid")
        );
    }

    #[tokio::test]
    async fn test_failsafe_is_idempotent() {
        let mock = MockSandbox::default();
        let sandbox: Arc<dyn Sandbox> = Arc::new(mock.clone());
        let (sink, _rx) = EventSink::channel(64);
        let profile = GenerationProfile::tailwind();

        let first = apply_failsafe(&sandbox, "/p", &profile, "bakery", &sink)
            .await
            .unwrap();
        let snapshot: Vec<_> = mock.paths().iter().map(|p| (p.clone(), mock.file(p))).collect();

        let second = apply_failsafe(&sandbox, "/p", &profile, "bakery", &sink)
            .await
            .unwrap();
        let again: Vec<_> = mock.paths().iter().map(|p| (p.clone(), mock.file(p))).collect();

        assert_eq!(first.repaired.len(), 8);
        assert!(second.repaired.is_empty());
        assert_eq!(second.before, first.after);
        assert_eq!(second.after, first.after);
        assert_eq!(snapshot, again);
    }
}
