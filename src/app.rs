use anyhow::{Context, Result};
use colored::Colorize;

use invocation::{temp, Errors, InvocationId, Issue, SlotIndex, SlotValue, ValidationReport};
use sequence::MacroInvocation;
use syntax::{self, ast};
use util::HashMap;

use crate::exec::{self, CancelToken, Scheduler};
use crate::fs::Fs;
use crate::load::{self, Pipeline};
use crate::settings::Settings;
use crate::ui::Ui;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{name} ({run}), slot {index} \"{description}\": {issue}")]
    InvalidSlot {
        name: String,
        run: invocation::RunNumber,
        index: SlotIndex,
        description: String,
        issue: Issue,
    },
    #[error("{dest_name}.{dest_index} reads {source_name}.{source_index}, which does not run before it")]
    BackwardRelation {
        source_name: String,
        source_index: SlotIndex,
        dest_name: String,
        dest_index: SlotIndex,
    },
}

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// Filesystem interface
    fs: Fs,
    /// User interface
    ui: Ui,
    /// stops the run when cancelled
    cancel: CancelToken,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        let fs = Fs::new(&settings.log_dir, settings.dry_run);
        let ui = Ui::new(&settings);
        Self {
            settings,
            fs,
            ui,
            cancel: CancelToken::default(),
        }
    }

    /// A handle that stops a running pipeline from another thread:
    /// the current process is killed and nothing further is started.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Load the pipeline file, check it, and run it.
    pub fn run(mut self) -> Result<()> {
        let mut strbuf = String::with_capacity(0); // will be resized later.
        let mut pipeline = self.load_pipeline(&mut strbuf)?;

        if let Some(executable) = &self.settings.runtime {
            log::debug!("runtime executable overridden with {executable:?}");
            pipeline.runtime.executable = executable.clone();
        }

        self.check_pipeline(&mut pipeline)?;

        let order = pipeline.invocations.execution_order()?;
        self.print_plan(&pipeline, &order);
        if self.settings.dry_run || !self.ui.confirm("Proceed?")? {
            return Ok(());
        }

        if self.settings.verbose > 0 {
            eprintln!("Using log directory {:?}", self.settings.log_dir);
        }
        self.fs.ensure_log_dir_exists(self.settings.verbose > 0)?;

        eprintln!("\n{}.\n", "Starting pipeline execution".magenta());
        let Pipeline {
            mut invocations,
            runtime,
        } = pipeline;
        let mut scheduler = Scheduler::new(
            runtime,
            self.fs,
            self.ui,
            self.cancel,
            self.settings.keep_going,
        );
        let summary = scheduler
            .run(&mut invocations)
            .context("while running pipeline")?;

        if !summary.is_success() {
            return Err(exec::Error::PipelineFailed {
                failed: summary.failed,
                cancelled: summary.cancelled,
                skipped: summary.skipped,
            }
            .into());
        }
        Ok(())
    }
}

// LOADING //////////////////
impl App {
    fn load_pipeline(&mut self, strbuf: &mut String) -> Result<Pipeline> {
        self.read_pipeline_to_buf(strbuf)?;
        let items = self.parse_pipeline(&*strbuf)?;

        self.ui.verbose_progress("Loading pipeline");
        self.ui.start_timer();
        let name = self
            .settings
            .pipeline
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pipeline = load::load(items, &name, self.settings.pipeline_parent_dir()?)
            .with_context(|| format!("while loading pipeline file {:?}", self.settings.pipeline))?;
        self.ui.done();
        self.ui.print_elapsed("Loading pipeline");

        if self.settings.verbose > 0 {
            eprintln!(
                "Loaded pipeline with {} invocations.",
                pipeline.invocations.sequence().len()
            );
        }
        Ok(pipeline)
    }

    fn read_pipeline_to_buf(&mut self, strbuf: &mut String) -> Result<()> {
        self.ui
            .verbose_progress_debug("Reading pipeline file", &self.settings.pipeline);
        self.fs
            .read_to_buf(&self.settings.pipeline, strbuf)
            .with_context(|| format!("while reading pipeline file {:?}", self.settings.pipeline))?;
        self.ui.done();
        Ok(())
    }

    fn parse_pipeline<'a>(&mut self, text: &'a str) -> Result<Vec<ast::Item<'a>>> {
        self.ui.verbose_progress("Parsing pipeline file");
        self.ui.start_timer();
        let items = syntax::parse(text)
            .with_context(|| format!("while parsing pipeline file {:?}", self.settings.pipeline))?;
        self.ui.done();
        self.ui.print_elapsed("Parsing pipeline file");
        Ok(items)
    }
}

// CHECKING /////////////////
impl App {
    /// Infer relations, then report every invalid slot at once.
    fn check_pipeline(&self, pipeline: &mut Pipeline) -> Result<()> {
        self.ui.verbose_progress("Inferring relations");
        pipeline.invocations.update_relations()?;
        self.ui.done();
        log::info!(
            "{} relations between arguments",
            pipeline.invocations.sequence().relations().len()
        );

        let mut errors = Errors::default();
        for inv in pipeline.invocations.sequence().iter() {
            let mut report = ValidationReport::default();
            inv.validate(&mut report);
            for (index, issue) in report.iter() {
                let description = inv
                    .slot(index)
                    .map(|slot| slot.description().to_owned())
                    .unwrap_or_default();
                errors.add(
                    Error::InvalidSlot {
                        name: inv.name().to_owned(),
                        run: inv.run_number(),
                        index,
                        description,
                        issue: issue.clone(),
                    }
                    .into(),
                );
            }
        }
        if pipeline.invocations.run_order_links() {
            if let Err(e) = pipeline.invocations.graph().check_acyclic() {
                errors.add(e.into());
            }
        }
        // a cycle was reported above, so only a valid order is checked:
        if let Ok(order) = pipeline.invocations.execution_order() {
            check_relation_order(&pipeline.invocations, &order, &mut errors);
        }
        errors.print_recap("validating pipeline")?;
        Ok(())
    }
}

/// Report every relation whose source does not run before its destination.
/// Such a destination would be corrected before its source has a value.
fn check_relation_order(invocations: &MacroInvocation, order: &[InvocationId], errors: &mut Errors) {
    let position: HashMap<InvocationId, usize> =
        order.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
    let name_of = |id| {
        invocations
            .get(id)
            .map(|inv| inv.name().to_owned())
            .unwrap_or_default()
    };

    let mut backward: Vec<_> = invocations
        .sequence()
        .relations()
        .iter()
        .filter(|(source, dest)| {
            match (position.get(&source.invocation()), position.get(&dest.invocation())) {
                (Some(s), Some(d)) => s >= d,
                _ => false,
            }
        })
        .collect();
    backward.sort_by_key(|(source, dest)| (position[&dest.invocation()], dest.index(), source.index()));

    for (source, dest) in backward {
        errors.add(
            Error::BackwardRelation {
                source_name: name_of(source.invocation()),
                source_index: source.index(),
                dest_name: name_of(dest.invocation()),
                dest_index: dest.index(),
            }
            .into(),
        );
    }
}

// PLAN /////////////////////
impl App {
    /// Print the invocations in the order they will run, with their arguments
    /// as they stand before correction.
    fn print_plan(&self, pipeline: &Pipeline, order: &[InvocationId]) {
        let invocations = &pipeline.invocations;
        eprintln!(
            "\n{} {} ({} invocations):",
            "Plan for".green(),
            invocations.name(),
            order.len()
        );
        for id in order {
            let Ok(inv) = invocations.get(*id) else {
                continue;
            };
            eprintln!(
                "  {} {} [{} {}]",
                inv.run_number(),
                inv.name().green(),
                inv.module().kind,
                inv.module().location
            );
            if invocations.run_order_links() {
                if let Ok(waits) = invocations.graph().wait_set(*id) {
                    let names: Vec<_> = waits
                        .filter_map(|w| invocations.get(w).ok())
                        .map(|w| w.name())
                        .collect();
                    if !names.is_empty() {
                        eprintln!("      after {}", names.join(", "));
                    }
                }
            }
            for (key, slot) in inv.keyed_slots() {
                let value = if let Some(route) = slot.temp_route() {
                    format!(
                        "<temp {}*{}>",
                        temp::effective_prefix(route),
                        temp::extension_for(slot.marker())
                    )
                } else {
                    match slot.value() {
                        SlotValue::Reference(source) => match invocations.get(source.invocation()) {
                            Ok(src) => format!("-> {}.{}", src.name(), source.index()),
                            Err(_) => slot.value().to_string(),
                        },
                        literal => literal.to_string(),
                    }
                };
                eprintln!(
                    "    {} {} {}: {}",
                    key.index(),
                    slot.kind(),
                    slot.description(),
                    value
                );
            }
        }
        eprintln!();
        if self.settings.dry_run {
            eprintln!("{}", "Dry run; nothing was executed.".yellow());
        }
    }
}
