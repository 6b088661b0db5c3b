//! Typst source generation and compilation.
//!
//! The store only hands out IDs; the Typst library under `src/lib.typ` in the
//! typst root resolves them to content at compile time.

use crate::model::Node;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

const LIBRARY_IMPORT: &str = "#import \"/src/lib.typ\": *";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("preview not supported for {0} nodes")]
    Unsupported(&'static str),
    #[error("typst executable '{0}' not found")]
    CompilerMissing(String),
    #[error("typst compilation failed: {stderr}")]
    CompileFailed { stderr: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Quotes `value` as a Typst string literal.
fn typst_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Typst source for a single-node preview page. Solutions are always shown.
pub fn preview_source(node: &Node) -> Result<String, RenderError> {
    let body = match node {
        Node::Question(q) => format!("#question({})", typst_str(&q.id)),
        Node::Definition(d) => format!("#def({})", typst_str(&d.id)),
        Node::Tool(t) => format!("#tool({})", typst_str(&t.id)),
        Node::Example(e) => format!("#ex({})", typst_str(&e.id)),
        Node::Mistake(m) => format!("== Mistake: {}\n{}", m.id, m.description),
        other => return Err(RenderError::Unsupported(other.kind().as_str())),
    };

    Ok(format!(
        "{LIBRARY_IMPORT}\n\
         #show_solutions.update(true)\n\
         #set page(width: 14cm, height: auto, margin: 0.5cm, header: none, footer: none)\n\
         #set text(font: \"Times New Roman\", size: 11pt)\n\
         \n\
         {body}\n"
    ))
}

/// Typst source for an A4 exam over `question_ids`, in order.
///
/// `show_solutions` toggles the answer key rendering of the library.
pub fn exam_source(title: &str, question_ids: &[&str], show_solutions: bool) -> String {
    let mut content = String::new();
    for (i, id) in question_ids.iter().enumerate() {
        content.push_str(&format!("== Question {}\n#question({})\n\n", i + 1, typst_str(id)));
    }

    format!(
        "{LIBRARY_IMPORT}\n\
         \n\
         #show_solutions.update({show_solutions})\n\
         \n\
         #set page(\n  \
           paper: \"a4\",\n  \
           margin: 2cm,\n  \
           header: align(right)[\n    \
             *Math Exam Generated on #datetime.today().display()*\n  \
           ]\n\
         )\n\
         #set text(font: \"Times New Roman\", size: 11pt)\n\
         \n\
         = {title}\n\
         \n\
         {content}\n\
         #v(2em)\n\
         #align(center)[*End of Examination*]\n"
    )
}

/// Keeps a node ID usable as a file stem.
pub fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Output format of one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Png { ppi: u32 },
}

/// Runs the `typst` compiler as a child process.
#[derive(Debug, Clone)]
pub struct TypstRenderer {
    bin: String,
    root: PathBuf,
    output_dir: PathBuf,
    ppi: u32,
}

impl TypstRenderer {
    pub fn new(bin: impl Into<String>, root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            root: root.into(),
            output_dir: output_dir.into(),
            ppi: 144,
        }
    }

    pub fn with_ppi(mut self, ppi: u32) -> Self {
        self.ppi = ppi;
        self
    }

    /// Writes `source` to `input` and compiles it to `output`.
    pub async fn compile(
        &self,
        source: &str,
        input: &Path,
        output: &Path,
        format: Format,
    ) -> Result<PathBuf, RenderError> {
        if let Some(parent) = input.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(input, source).await?;

        let mut cmd = Command::new(&self.bin);
        cmd.arg("compile").arg("--root").arg(&self.root);
        if let Format::Png { ppi } = format {
            cmd.args(["--format", "png", "--ppi"]).arg(ppi.to_string());
        }
        cmd.arg(input).arg(output);
        debug!(input = %input.display(), output = %output.display(), "running typst");

        let result = match cmd.output().await {
            Ok(result) => result,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RenderError::CompilerMissing(self.bin.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        if !result.status.success() {
            return Err(RenderError::CompileFailed {
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(output.to_path_buf())
    }

    /// Compiles a PNG preview of one node into `<output_dir>/previews/`.
    pub async fn preview(&self, node: &Node) -> Result<PathBuf, RenderError> {
        let source = preview_source(node)?;
        let dir = self.output_dir.join("previews");
        let stem = file_stem(node.id());
        let png = self
            .compile(
                &source,
                &dir.join(format!("{stem}.typ")),
                &dir.join(format!("{stem}.png")),
                Format::Png { ppi: self.ppi },
            )
            .await?;
        info!(id = node.id(), path = %png.display(), "preview rendered");
        Ok(png)
    }

    /// Compiles the student exam and its answer key. Returns both PDF paths.
    pub async fn exam(
        &self,
        name: &str,
        title: &str,
        question_ids: &[&str],
    ) -> Result<(PathBuf, PathBuf), RenderError> {
        let base = self.output_dir.join(file_stem(name));
        let key_base = self.output_dir.join(format!("{}_key", file_stem(name)));

        let exam = self
            .compile(
                &exam_source(title, question_ids, false),
                &base.with_extension("typ"),
                &base.with_extension("pdf"),
                Format::Pdf,
            )
            .await?;
        let key = self
            .compile(
                &exam_source(title, question_ids, true),
                &key_base.with_extension("typ"),
                &key_base.with_extension("pdf"),
                Format::Pdf,
            )
            .await?;
        info!(exam = %exam.display(), key = %key.display(), questions = question_ids.len(), "exam rendered");
        Ok((exam, key))
    }
}
