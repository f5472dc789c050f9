//! Prompt text for the three stages, in two profiles.
//!
//! Builders read the repository view and earlier stage outputs from a
//! [`StageContext`] and never touch the model themselves.

use repoviz_shared::PromptProfile;

use crate::pipeline::{Stage, StageContext};

/// Tag wrapping the explanation stage's answer.
pub const EXPLANATION_TAG: &str = "explanation";

/// Tag wrapping the mapping stage's answer.
pub const COMPONENT_MAPPING_TAG: &str = "component_mapping";

/// System and user turns for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

// ---------------------------------------------------------------------------
// Detailed profile
// ---------------------------------------------------------------------------

const DETAILED_EXPLAIN_SYSTEM: &str = "\
You are helping a principal software engineer draw the most accurate system design \
diagram of a project. You receive the project's file tree inside <file_tree> tags and \
its README inside <readme> tags.

Work through the following:

1. Determine what kind of project this is (full-stack application, library, CLI tool, \
compiler, service, ...) and what it is for, using the README and the layout.
2. Study the structure: top-level directories, naming patterns that reveal the \
architecture (layers, MVC, plugins, microservices), and configuration, build or \
deployment files.
3. Pull any architecture, dependency or stack details out of the README.
4. Explain how to draw the diagram: the main components (frontend, backend, storage, \
external services, pipelines), how they interact, the architectural patterns in play, \
and the key technologies.
5. Tailor the advice to the project type: for applications stress frontend/backend \
separation and data access, for tools stress the core flow and extension points, for \
compilers stress stages and intermediate representations.
6. Ask for clear labels, directional arrows for data flow or dependencies, and colors \
or shapes that distinguish component kinds.
7. Be detailed: split the system into as many meaningful components as it supports.

Return the explanation wrapped only in <explanation>...</explanation> tags. Keep it \
concise; simple HTML markup is allowed.";

const DETAILED_MAP_SYSTEM: &str = "\
You map the components of a system design onto the files and directories of a \
project. The design explanation is inside <explanation> tags and the project's file \
tree is inside <file_tree> tags in the user's message.

Identify the major components, modules and services in the explanation, then find the \
files or directories in the tree that most plausibly implement each one.

Guidelines:
1. Concentrate on the major components of the design.
2. Prefer paths that clearly correspond to a component.
3. Directories and individual files are both acceptable targets.
4. Leave out any component without a convincing match.

Answer with nothing but this list:

<component_mapping>
1. [Component Name]: [File/Directory Path]
2. [Component Name]: [File/Directory Path]
...
</component_mapping>";

const DETAILED_DIAGRAM_SYSTEM: &str = "\
You are a principal software engineer drawing a system design diagram in Mermaid.js \
from a design explanation. The explanation is inside <explanation> tags; components \
already matched to repository paths are listed inside <component_mapping> tags.

Build the diagram as follows:
1. Read the explanation and identify the components, services and their relationships.
2. Use a `flowchart TD` (top-down) layout so the graph grows vertically.
3. Include every major component and show relationships with arrows.

Rules:
- Use different node shapes (rectangles, cylinders, ...) for different component kinds.
- Wrap any node label containing spaces or special characters in double quotes.
- Group related nodes in subgraph blocks; never style subgraph headers.
- Define colors with classDef and apply them to nodes only.
- Add one click directive for every component in <component_mapping>, with the path \
only and no URL, for example: click Example \"app/example.js\"
- Use a directory path for directories and a file path for files.
- Avoid long horizontal chains.

Output only raw Mermaid.js code: no code fences, no markdown, no init block, no \
commentary.";

// ---------------------------------------------------------------------------
// Compact profile
// ---------------------------------------------------------------------------

const COMPACT_EXPLAIN_SYSTEM: &str = "You are a software architecture expert. \
Produce a concise, HTML-friendly explanation wrapped in <explanation> tags.";

const COMPACT_MAP_SYSTEM: &str = "You are a software architect assistant. \
Produce a mapping wrapped in <component_mapping> tags.";

const COMPACT_DIAGRAM_SYSTEM: &str = "You are a senior principal software engineer. \
Generate valid, clickable, color-coded Mermaid.js code only.";

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Stage 1: architecture explanation from the file tree and README.
pub fn explain(profile: PromptProfile, ctx: &StageContext<'_>) -> PromptPair {
    let inputs = format!(
        "<file_tree>\n{}\n</file_tree>\n\n<readme>\n{}\n</readme>\n\n",
        ctx.digest.file_tree_text(),
        ctx.digest.readme_text()
    );

    match profile {
        PromptProfile::Detailed => PromptPair {
            system: DETAILED_EXPLAIN_SYSTEM.to_string(),
            user: format!(
                "{inputs}Your task: as a principal software engineer, analyze the file tree \
                 and README above and explain the project's architecture following the \
                 system instructions. Return ONLY the explanation wrapped in \
                 <explanation>...</explanation> tags."
            ),
        },
        PromptProfile::Compact => PromptPair {
            system: COMPACT_EXPLAIN_SYSTEM.to_string(),
            user: format!(
                "{inputs}Your task: as a principal software engineer, explain the project's \
                 architecture.\n\
                 - Identify the project type and main components (frontend, backend, services, databases).\n\
                 - Call out architectural patterns (MVC, microservices, event-driven, ...).\n\
                 - Highlight key technologies and how they interact.\n\n\
                 Return ONLY the explanation wrapped in <explanation>...</explanation> tags."
            ),
        },
    }
}

/// Stage 2: map explained components onto repository paths.
pub fn map(profile: PromptProfile, ctx: &StageContext<'_>) -> PromptPair {
    let inputs = format!(
        "<explanation>\n{}\n</explanation>\n\n<file_tree>\n{}\n</file_tree>\n\n",
        ctx.output(Stage::Explain),
        ctx.digest.file_tree_text()
    );

    match profile {
        PromptProfile::Detailed => PromptPair {
            system: DETAILED_MAP_SYSTEM.to_string(),
            user: format!(
                "{inputs}Your task: map each major component from the explanation to its \
                 corresponding file or directory path, following the system instructions exactly."
            ),
        },
        PromptProfile::Compact => PromptPair {
            system: COMPACT_MAP_SYSTEM.to_string(),
            user: format!(
                "{inputs}Your task: map each major component from the explanation to its \
                 corresponding file or directory path.\nOutput as:\n\
                 <component_mapping>\nComponent A: path/to/A\nComponent B: path/to/B\n...\n\
                 </component_mapping>"
            ),
        },
    }
}

/// Stage 3: Mermaid flowchart from the explanation and the mapping.
pub fn diagram(profile: PromptProfile, ctx: &StageContext<'_>) -> PromptPair {
    let inputs = format!(
        "<explanation>\n{}\n</explanation>\n\n<component_mapping>\n{}\n</component_mapping>\n",
        ctx.output(Stage::Explain),
        ctx.output(Stage::Map)
    );

    match profile {
        PromptProfile::Detailed => PromptPair {
            system: DETAILED_DIAGRAM_SYSTEM.to_string(),
            user: inputs,
        },
        PromptProfile::Compact => PromptPair {
            system: COMPACT_DIAGRAM_SYSTEM.to_string(),
            user: format!(
                "{inputs}\nProduce only the Mermaid.js diagram code (no fences or extra text), using:\n\
                 - flowchart TD\n\
                 - subgraphs for layers\n\
                 - click events with the exact paths from the mapping\n\
                 - quoted labels when they contain special characters\n\
                 - color classes for frontend, backend and storage as appropriate\n\n\
                 Return the raw Mermaid.js code."
            ),
        },
    }
}
