//! Offline responder: deterministic-enough canned replies for offline mode
//! and the terminal fallback path.
//!
//! Classification is two ordered keyword tables (agent role, then request
//! kind); first match wins. The tables are pure data so new roles or kinds
//! never touch control flow. Template selection uses a small seedable LCG so
//! tests can pin the output.
//!
//! Convention that downstream code extraction relies on: every simulated code
//! answer puts the filename on its own line immediately before the fenced
//! block.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────
// Classification tables
// ─────────────────────────────────────────────

/// Role inferred from the prompt, in table priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentRole {
    LeadDeveloper,
    FrontendDeveloper,
    BackendDeveloper,
    DatabaseDeveloper,
    MobileDeveloper,
    Developer,
    Tester,
    Designer,
    SalesAgent,
    DevOpsEngineer,
    SecurityExpert,
    DocumentationWriter,
    Unknown,
}

/// What the prompt is asking for, in table priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    CodeJavascript,
    CodePython,
    CodeJava,
    CodeCsharp,
    CodeWeb,
    CodeFrontendFramework,
    CodeSql,
    ConfigDocker,
    ConfigKubernetes,
    ConfigCicd,
    Documentation,
    CodeGeneric,
    DesignUiUx,
    SalesMarketing,
    Architecture,
    Testing,
    Review,
    SecurityAnalysis,
    Generic,
}

impl RequestKind {
    fn is_code(self) -> bool {
        matches!(
            self,
            RequestKind::CodeJavascript
                | RequestKind::CodePython
                | RequestKind::CodeJava
                | RequestKind::CodeCsharp
                | RequestKind::CodeWeb
                | RequestKind::CodeFrontendFramework
                | RequestKind::CodeSql
                | RequestKind::ConfigDocker
                | RequestKind::ConfigKubernetes
                | RequestKind::ConfigCicd
                | RequestKind::CodeGeneric
        )
    }
}

/// Primary role table. `Developer` is refined through
/// [`DEVELOPER_SPECIALIZATIONS`] on match.
const ROLE_RULES: &[(AgentRole, &[&str])] = &[
    (
        AgentRole::LeadDeveloper,
        &["lead developer", "architecture", "technical decision", "requirements"],
    ),
    (AgentRole::Developer, &["developer"]),
    (
        AgentRole::Tester,
        &["tester", "test", "bugs", "quality assurance"],
    ),
    (
        AgentRole::Designer,
        &["designer", "design", "ui/ux", "mockup", "wireframe"],
    ),
    (AgentRole::SalesAgent, &["sales", "marketing", "pitch"]),
    (
        AgentRole::DevOpsEngineer,
        &["devops", "ci/cd", "deployment", "kubernetes", "docker", "infrastructure"],
    ),
    (
        AgentRole::SecurityExpert,
        &["security", "vulnerability", "pentest"],
    ),
    (
        AgentRole::DocumentationWriter,
        &["documentation", "docs", "user guide", "instructions"],
    ),
];

const DEVELOPER_SPECIALIZATIONS: &[(AgentRole, &[&str])] = &[
    (
        AgentRole::FrontendDeveloper,
        &["frontend", "ui", "user interface"],
    ),
    (
        AgentRole::BackendDeveloper,
        &["backend", "api", "server-side"],
    ),
    (
        AgentRole::DatabaseDeveloper,
        &["database", "sql", "nosql"],
    ),
    (AgentRole::MobileDeveloper, &["mobile", "ios", "android"]),
];

/// Verbs that mark a prompt as a creation request (code/config path).
const CREATION_VERBS: &[&str] = &["create", "write", "generate", "implement", "develop", "build"];

/// Kind table for creation requests. Order matters: "javascript" must come
/// before "java", and the file-extension fallbacks catch prompts that name a
/// file instead of a language.
const CODE_KIND_RULES: &[(RequestKind, &[&str])] = &[
    (RequestKind::CodeJavascript, &["javascript", "js"]),
    (RequestKind::CodePython, &["python", ".py"]),
    (RequestKind::CodeJava, &["java"]),
    (RequestKind::CodeCsharp, &["c#", "csharp"]),
    (RequestKind::CodeWeb, &["html", "css", "web page"]),
    (
        RequestKind::CodeFrontendFramework,
        &["react", "vue", "angular", "component"],
    ),
    (RequestKind::CodeSql, &["sql", "query", "schema"]),
    (RequestKind::ConfigDocker, &["dockerfile"]),
    (RequestKind::ConfigKubernetes, &["kubernetes", "k8s"]),
    (RequestKind::ConfigCicd, &["ci/cd", "pipeline"]),
    (
        RequestKind::Documentation,
        &["api documentation", "user guide"],
    ),
];

/// Kind table for non-creation requests.
const OTHER_KIND_RULES: &[(RequestKind, &[&str])] = &[
    (
        RequestKind::DesignUiUx,
        &["design", "mockup", "wireframe", "user interface", "ux"],
    ),
    (
        RequestKind::SalesMarketing,
        &["sales copy", "marketing material", "pitch deck", "advertisement"],
    ),
    (
        RequestKind::Architecture,
        &["architecture", "system design", "structure"],
    ),
    (
        RequestKind::Testing,
        &["test", "validate", "verification", "verify"],
    ),
    (RequestKind::Review, &["review", "assess", "evaluate"]),
    (
        RequestKind::SecurityAnalysis,
        &["security scan", "security analysis", "security measures"],
    ),
];

/// Classify the agent role from the prompt (case-insensitive, first match).
pub fn classify_role(prompt: &str) -> AgentRole {
    let lower = prompt.to_lowercase();
    for (role, keywords) in ROLE_RULES {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            if *role == AgentRole::Developer {
                for (special, keywords) in DEVELOPER_SPECIALIZATIONS {
                    if keywords.iter().any(|kw| lower.contains(kw)) {
                        return *special;
                    }
                }
            }
            return *role;
        }
    }
    AgentRole::Unknown
}

/// Classify what is being asked for (case-insensitive, first match).
pub fn classify_kind(prompt: &str) -> RequestKind {
    let lower = prompt.to_lowercase();
    if CREATION_VERBS.iter().any(|kw| lower.contains(kw)) {
        for (kind, keywords) in CODE_KIND_RULES {
            if keywords.iter().any(|kw| lower.contains(kw)) {
                return *kind;
            }
        }
        return RequestKind::CodeGeneric;
    }
    for (kind, keywords) in OTHER_KIND_RULES {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return *kind;
        }
    }
    RequestKind::Generic
}

// ─────────────────────────────────────────────
// Filename extraction
// ─────────────────────────────────────────────

const KNOWN_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "java", "cs", "rb", "go", "rs", "php", "sql", "html", "css",
    "json", "yaml", "yml", "md", "sh", "toml",
];

/// Pick the first token that looks like a source filename, so the canned code
/// answer can echo the name the prompt asked for.
pub fn extract_filename(prompt: &str) -> Option<String> {
    for token in prompt.split_whitespace() {
        let trimmed = token.trim_matches(|c: char| "\"'`(),;:!?".contains(c));
        if let Some((stem, ext)) = trimmed.rsplit_once('.') {
            if !stem.is_empty() && KNOWN_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

// ─────────────────────────────────────────────
// Responder
// ─────────────────────────────────────────────

/// Produces canned text for a prompt. Swappable so tests can pin responses.
pub trait OfflineResponder: Send + Sync {
    fn respond(&self, prompt: &str) -> String;
}

/// The stock responder: role/kind classification plus templated pools.
pub struct CannedResponder {
    state: Mutex<u64>,
}

impl Default for CannedResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl CannedResponder {
    /// Seed from the wall clock.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0);
        Self::with_seed(seed)
    }

    /// Fixed seed for reproducible output.
    pub fn with_seed(seed: u64) -> Self {
        CannedResponder {
            state: Mutex::new(seed),
        }
    }

    /// LCG step (Numerical Recipes constants), reduced to an index.
    fn pick(&self, len: usize) -> usize {
        let mut state = self.state.lock().expect("picker lock poisoned");
        *state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223) % (1u64 << 32);
        (*state as usize) % len.max(1)
    }

    fn pick_str(&self, pool: &[String]) -> String {
        pool[self.pick(pool.len())].clone()
    }
}

/// Last-100-chars preview of the prompt, used inside templates.
fn preview_of(prompt: &str) -> String {
    let chars: Vec<char> = prompt.chars().collect();
    if chars.len() > 100 {
        let tail: String = chars[chars.len() - 100..].iter().collect();
        format!("...{}", tail)
    } else {
        prompt.to_string()
    }
}

/// Filename line + fenced block, the shape the code-extraction layer parses.
fn code_snippet(intro: &str, filename: &str, lang: &str, code: &str, outro: &str) -> String {
    format!("{intro}\n{filename}\n```{lang}\n{code}\n```\n{outro}")
}

impl OfflineResponder for CannedResponder {
    fn respond(&self, prompt: &str) -> String {
        let role = classify_role(prompt);
        let kind = classify_kind(prompt);
        let preview = preview_of(prompt);
        let filename = extract_filename(prompt);
        tracing::debug!(?role, ?kind, "generating offline response");

        match role {
            AgentRole::LeadDeveloper => self.lead_developer(&preview, kind),
            AgentRole::FrontendDeveloper => {
                self.developer(&preview, RequestKind::CodeFrontendFramework, "Frontend Developer", filename)
            }
            AgentRole::BackendDeveloper => {
                self.developer(&preview, kind_or_generic(kind), "Backend Developer", filename)
            }
            AgentRole::DatabaseDeveloper => {
                self.developer(&preview, RequestKind::CodeSql, "Database Developer", filename)
            }
            AgentRole::MobileDeveloper => {
                self.developer(&preview, kind_or_generic(kind), "Mobile Developer", filename)
            }
            AgentRole::Developer => self.developer(&preview, kind, "Developer", filename),
            AgentRole::Tester => self.tester(&preview),
            AgentRole::Designer => self.designer(&preview, kind),
            AgentRole::SalesAgent => self.sales_agent(&preview),
            AgentRole::DevOpsEngineer => self.devops(&preview, kind, filename),
            AgentRole::SecurityExpert => self.security_expert(&preview),
            AgentRole::DocumentationWriter => self.documentation_writer(&preview, kind, filename),
            AgentRole::Unknown => {
                if kind.is_code() {
                    self.developer(&preview, kind, "Developer", filename)
                } else {
                    match kind {
                        RequestKind::Testing => self.tester(&preview),
                        RequestKind::Architecture => self.lead_developer(&preview, kind),
                        RequestKind::DesignUiUx => self.designer(&preview, kind),
                        RequestKind::SalesMarketing => self.sales_agent(&preview),
                        _ => self.generic(&preview),
                    }
                }
            }
        }
    }
}

fn kind_or_generic(kind: RequestKind) -> RequestKind {
    if kind.is_code() {
        kind
    } else {
        RequestKind::CodeGeneric
    }
}

impl CannedResponder {
    fn generic(&self, preview: &str) -> String {
        let pool = [
            format!("[OFFLINE MODE] Generic answer for: \"{preview}\". No specific agent role could be detected."),
            format!("[OFFLINE MODE] This is a general demo answer. You asked: \"{preview}\"."),
            format!("[OFFLINE MODE] Simulated answer to your question about \"{preview}\". Disable offline mode for real answers."),
        ];
        self.pick_str(&pool)
    }

    fn lead_developer(&self, preview: &str, kind: RequestKind) -> String {
        if kind == RequestKind::Architecture {
            let pool = [
                code_snippet(
                    &format!("After analyzing the requirements for \"{preview}\", I propose the following architecture:"),
                    "architecture.md",
                    "markdown",
                    "## System Architecture\n1. **Frontend**: React, Redux\n2. **Backend**: Node.js/Express, MongoDB\n3. **Deployment**: Docker, CI/CD with GitHub Actions",
                    "This architecture offers scalability and maintainability.",
                ),
                code_snippet(
                    &format!("For the project \"{preview}\" I recommend:"),
                    "config.yaml",
                    "yaml",
                    "# Architecture decisions\nmicroservices: true\neventDriven: true\ndatabaseStrategy:\n  transactional: PostgreSQL\n  search: Elasticsearch\nstack:\n  frontend: Vue.js\n  services: [Node.js, Python]",
                    "This gives a robust, scalable solution.",
                ),
            ];
            return self.pick_str(&pool);
        }
        code_snippet(
            &format!("Technical decisions for \"{preview}\":"),
            "tech_specs.txt",
            "",
            "- Modular architecture\n- RESTful API (Node.js/Express)\n- PostgreSQL database\n- JWT authentication\n- Frontend: React + TypeScript",
            "",
        )
    }

    fn developer(
        &self,
        preview: &str,
        kind: RequestKind,
        specialization: &str,
        filename: Option<String>,
    ) -> String {
        let pool: Vec<String> = match kind {
            RequestKind::CodeJavascript => vec![
                code_snippet(
                    &format!("As {specialization} I wrote the JavaScript function for \"{preview}\":"),
                    filename.as_deref().unwrap_or("utils.js"),
                    "javascript",
                    "function exampleJsFunction(param) {\n  console.log('Hello from JavaScript!', param);\n  return param * 2;\n}",
                    "This is a basic example.",
                ),
                code_snippet(
                    &format!("As {specialization} I wrote this JavaScript code for \"{preview}\":"),
                    filename.as_deref().unwrap_or("data_processor.js"),
                    "javascript",
                    "const processData = (data) => data.map(item => ({ ...item, processed: true }));",
                    "This function marks items as processed.",
                ),
            ],
            RequestKind::CodePython => vec![
                code_snippet(
                    &format!("Here is the Python code (as {specialization}) for \"{preview}\":"),
                    filename.as_deref().unwrap_or("main.py"),
                    "python",
                    "def example_python_function(param):\n    print(f\"Hello from Python! {param}\")\n    return param * 2",
                    "A basic Python function.",
                ),
                code_snippet(
                    &format!("As {specialization} I wrote this Python code for \"{preview}\":"),
                    filename.as_deref().unwrap_or("api_handler.py"),
                    "python",
                    "class ApiHandler:\n    def __init__(self, endpoint):\n        self.endpoint = endpoint\n\n    def fetch_data(self):\n        return {\"data\": \"sample data from \" + self.endpoint}",
                    "An API handler class.",
                ),
            ],
            RequestKind::CodeFrontendFramework | RequestKind::CodeWeb => vec![
                code_snippet(
                    &format!("As {specialization} I built the following React component for \"{preview}\":"),
                    filename.as_deref().unwrap_or("ButtonComponent.jsx"),
                    "jsx",
                    "import React from 'react';\n\nfunction ButtonComponent({ label, onClick }) {\n  return (\n    <button onClick={onClick} style={{ padding: '10px', margin: '5px' }}>\n      {label}\n    </button>\n  );\n}\n\nexport default ButtonComponent;",
                    "A simple reusable button.",
                ),
                code_snippet(
                    &format!("For \"{preview}\" I wrote this Vue component as {specialization}:"),
                    filename.as_deref().unwrap_or("UserCard.vue"),
                    "html",
                    "<template>\n  <div class=\"user-card\">\n    <h3>{{ user.name }}</h3>\n    <p>Email: {{ user.email }}</p>\n  </div>\n</template>\n<script>\nexport default { props: { user: Object } }\n</script>",
                    "A basic user card component.",
                ),
            ],
            RequestKind::CodeSql => vec![
                code_snippet(
                    &format!("As {specialization} I wrote the following SQL query for \"{preview}\":"),
                    filename.as_deref().unwrap_or("query.sql"),
                    "sql",
                    "SELECT id, name, email\nFROM users\nWHERE age > 30\nORDER BY name ASC;",
                    "This fetches the matching users.",
                ),
                code_snippet(
                    &format!("For \"{preview}\" I designed this SQL schema as {specialization}:"),
                    filename.as_deref().unwrap_or("schema.sql"),
                    "sql",
                    "CREATE TABLE IF NOT EXISTS products (\n    product_id SERIAL PRIMARY KEY,\n    product_name VARCHAR(255) NOT NULL,\n    price DECIMAL(10, 2) NOT NULL\n);",
                    "A basic products table.",
                ),
            ],
            _ => vec![code_snippet(
                &format!("[OFFLINE MODE - {specialization}] I wrote the code for \"{preview}\". Here is a fragment:"),
                filename.as_deref().unwrap_or("placeholder_code.js"),
                "javascript",
                "console.log('Placeholder implementation');\nfunction placeholder() { return true; }",
                "Disable offline mode for real code.",
            )],
        };
        self.pick_str(&pool)
    }

    fn tester(&self, preview: &str) -> String {
        let pool = [
            code_snippet(
                &format!("[OFFLINE MODE - Tester] I tested the code for \"{preview}\". Results:"),
                "test_report.md",
                "markdown",
                "- Unit tests: 15/15 passed\n- Integration tests: 8/10 passed (2 minor bugs found)\n- Performance test: within acceptable limits\nBugs reported: #BUG-123, #BUG-124.",
                "Disable offline mode for real test results.",
            ),
            code_snippet(
                &format!("[OFFLINE MODE - Tester] Test report for \"{preview}\":"),
                "functional_tests.txt",
                "",
                "- Functional tests: all main flows work as expected.\n- UI tests: no visual regressions found.\nConclusion: code is approved.",
                "Real reports in online mode.",
            ),
        ];
        self.pick_str(&pool)
    }

    fn designer(&self, preview: &str, kind: RequestKind) -> String {
        if kind == RequestKind::DesignUiUx || kind == RequestKind::CodeWeb {
            return code_snippet(
                &format!("[OFFLINE MODE - Designer] Here is an HTML mockup for \"{preview}\":"),
                "design_mockup.html",
                "html",
                "<div class=\"container\">\n  <h1>Mockup</h1>\n  <button class=\"cta-button\">Call to Action</button>\n</div>",
                "This is a concept. Full design in online mode.",
            );
        }
        format!("[OFFLINE MODE - Designer] I thought about the design for \"{preview}\". Focus on usability. Details in online mode.")
    }

    fn sales_agent(&self, preview: &str) -> String {
        code_snippet(
            &format!("[OFFLINE MODE - Sales Agent] Sales copy for \"{preview}\":"),
            "sales_copy.txt",
            "",
            "Discover the revolutionary solution! Boost your productivity.",
            "This is a draft. More persuasive copy in online mode.",
        )
    }

    fn devops(&self, preview: &str, kind: RequestKind, filename: Option<String>) -> String {
        if matches!(
            kind,
            RequestKind::ConfigDocker | RequestKind::ConfigKubernetes | RequestKind::ConfigCicd
        ) {
            return code_snippet(
                &format!("[OFFLINE MODE - DevOps] Here is a basic Dockerfile for \"{preview}\":"),
                filename.as_deref().unwrap_or("Dockerfile"),
                "dockerfile",
                "FROM node:18-alpine\nWORKDIR /app\nCOPY package*.json ./\nRUN npm install\nCOPY . .\nEXPOSE 3000\nCMD [\"npm\", \"start\"]",
                "This is a starting point. Full configuration in online mode.",
            );
        }
        format!("[OFFLINE MODE - DevOps] I planned the infrastructure and deployment strategy for \"{preview}\". Details in online mode.")
    }

    fn security_expert(&self, preview: &str) -> String {
        code_snippet(
            &format!("[OFFLINE MODE - Security Expert] Security analysis for \"{preview}\":"),
            "security_report.md",
            "markdown",
            "- Potential risks: SQL injection, XSS.\n- Recommended measures: input validation, output encoding.",
            "Detailed report in online mode.",
        )
    }

    fn documentation_writer(
        &self,
        preview: &str,
        kind: RequestKind,
        filename: Option<String>,
    ) -> String {
        if kind == RequestKind::Documentation {
            return code_snippet(
                &format!("[OFFLINE MODE - Documentation Writer] API documentation (draft) for \"{preview}\":"),
                filename.as_deref().unwrap_or("api_docs.md"),
                "markdown",
                "## Endpoint: /api/users\n- **GET /api/users**: returns the list of all users.",
                "Full OpenAPI/Swagger specification in online mode.",
            );
        }
        format!("[OFFLINE MODE - Documentation Writer] I started writing the documentation for \"{preview}\". Details in online mode.")
    }
}
