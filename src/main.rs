// Copyright (c) 2026 kernel-xref Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command line front end: load one result set and print JSON views on stdout.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use log::{debug, info, warn};
use serde::Serialize;

use kernel_xref::analysis::AnalysisKind;
use kernel_xref::debug::init_logging;
use kernel_xref::highlight::BinaryAddress;
use kernel_xref::report::Report;
use kernel_xref::result_index::{IndexHandle, ResultIndex, ResultInputs};
use kernel_xref::views::{AnalysisView, KernelSummary, LineCorrelation, OccurrenceView};

#[derive(Parser, Debug)]
#[command(
    name = "kernel-xref",
    version,
    about = "Cross-reference GPU kernel assembly, source and profiler findings"
)]
struct Cli {
    /// Machine assembly listing (nvdisasm -g output)
    #[arg(long = "sass")]
    sass: PathBuf,

    /// Intermediate assembly listing (PTX with .loc/.file directives)
    #[arg(long = "ptx")]
    ptx: PathBuf,

    /// Performance report JSON
    #[arg(long = "report")]
    report: PathBuf,

    /// Directory holding the source files named in the report's rename table
    #[arg(short = 's', long = "sources")]
    sources: PathBuf,

    /// Kernel to inspect (mangled name). Without it, all kernels are summarized.
    #[arg(short = 'k', long = "kernel")]
    kernel: Option<String>,

    #[command(flatten)]
    query: QueryArgs,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
}

#[derive(Args, Debug, Default)]
#[group(multiple = false)]
struct QueryArgs {
    /// Synthetic source line to correlate
    #[arg(long = "source-line")]
    source_line: Option<u32>,

    /// Machine instruction address, e.g. 0x50
    #[arg(long = "machine-addr")]
    machine_addr: Option<String>,

    /// Intermediate statement number
    #[arg(long = "ptx-line")]
    ptx_line: Option<u32>,
}

impl QueryArgs {
    fn is_empty(&self) -> bool {
        self.source_line.is_none() && self.machine_addr.is_none() && self.ptx_line.is_none()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KernelDetails {
    version: u64,
    summary: KernelSummary,
    analyses: Vec<AnalysisView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineQuery {
    version: u64,
    correlation: LineCorrelation,
    occurrences: Vec<OccurrenceView>,
}

/// Read the source blob for every old path in the rename table.
///
/// A blob is looked up under `dir` by its path relative to the filesystem root, then by file
/// name alone. Files that cannot be found are skipped; the index build reports them if a
/// kernel actually references them.
fn load_sources<'a>(
    dir: &Path,
    old_paths: impl IntoIterator<Item = &'a str>,
) -> Result<HashMap<String, String>> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let mut sources = HashMap::new();
    for old in old_paths {
        if sources.contains_key(old) {
            continue;
        }
        let relative = old.trim_start_matches(['/', '\\']);
        let mut candidates = vec![dir.join(relative)];
        if let Some(name) = Path::new(old).file_name() {
            candidates.push(dir.join(name));
        }
        match candidates.iter().find(|p| p.is_file()) {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                debug!("Source {} loaded from {}", old, path.display());
                sources.insert(old.to_string(), text);
            }
            None => warn!("No file for {} under {}", old, dir.display()),
        }
    }
    Ok(sources)
}

fn read_inputs(cli: &Cli) -> Result<ResultInputs> {
    let read = |path: &Path| {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    };
    let report_json = read(&cli.report)?;
    // The rename table is needed up front to know which blobs to load.
    let report = Report::parse(&report_json).context("Invalid performance report")?;
    let sources = load_sources(&cli.sources, report.file_renames.values().map(String::as_str))?;
    Ok(ResultInputs {
        machine_assembly: read(&cli.sass)?,
        intermediate_assembly: read(&cli.ptx)?,
        report_json,
        sources,
    })
}

fn line_query(index: &ResultIndex, kernel: &str, query: &QueryArgs) -> Result<LineQuery> {
    let correlation = if let Some(line) = query.source_line {
        LineCorrelation::for_source_line(index, kernel, line)
    } else if let Some(addr) = &query.machine_addr {
        let Some(address) = BinaryAddress::machine(addr) else {
            bail!("{} is not a hex address", addr);
        };
        LineCorrelation::for_address(index, kernel, &address)
    } else if let Some(n) = query.ptx_line {
        LineCorrelation::for_address(index, kernel, &BinaryAddress::Intermediate(n))
    } else {
        bail!("No line query given");
    };
    let occurrences = match correlation.source_line {
        Some(line) => AnalysisKind::ALL
            .into_iter()
            .flat_map(|kind| AnalysisView::at_source_line(index, kind, kernel, line))
            .collect(),
        None => Vec::new(),
    };
    Ok(LineQuery {
        version: index.version(),
        correlation,
        occurrences,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = init_logging(cli.debug)?;

    let inputs = read_inputs(&cli)?;
    let handle = IndexHandle::new();
    let index = handle.load(&inputs).context("Failed to index result set")?;
    info!("Loaded {} kernels", index.kernel_names().len());

    let Some(kernel) = cli.kernel.as_deref() else {
        if !cli.query.is_empty() {
            bail!("A line query needs --kernel");
        }
        return print_json(&KernelSummary::all(&index));
    };
    let Some(k) = index.kernel(kernel) else {
        bail!(
            "Unknown kernel {}. Known kernels: {}",
            kernel,
            index.kernel_names().join(", ")
        );
    };

    if cli.query.is_empty() {
        print_json(&KernelDetails {
            version: index.version(),
            summary: KernelSummary::new(&index, k),
            analyses: AnalysisView::for_kernel(&index, kernel),
        })
    } else {
        print_json(&line_query(&index, kernel, &cli.query)?)
    }
}
