// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes each subcommand to its
// use case in Layer 2. Printing results to the user happens here
// and nowhere else.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

use crate::application::prepare_use_case;
use crate::infra::metrics::EvalReport;

#[derive(Parser, Debug)]
#[command(
    name = "kbqa-pipeline",
    version = "0.1.0",
    about = "Prepare SimpleQuestions data with a KB graph, then train and evaluate relation matching."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Thin routing only; every step lives in the application layer.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::BuildVocab(args) => {
                let vocab = prepare_use_case::build_vocab(&args.into())?;
                println!(
                    "Vocabulary built: {} words, {} relations.",
                    vocab.num_words(),
                    vocab.num_relations()
                );
            }
            Commands::BuildGraph(args) => {
                let vocab = prepare_use_case::build_graph(&args.into())?;
                println!("Graph built over {} entities.", vocab.num_entities());
            }
            Commands::Embed(args) => {
                let matrix = prepare_use_case::embed(&args.into())?;
                println!("Embedding matrix {}x{} saved.", matrix.rows(), matrix.dim());
            }
            Commands::Train(args) => run_train(args)?,
            Commands::Evaluate(args) => run_evaluate(args)?,
        }
        Ok(())
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on splits in: {}", args.data_dir);
    let report = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Checkpoint saved.");
    print_report("test", &report);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let split = args.split.clone();
    let report = EvaluateUseCase::new(args.checkpoint_dir, args.split, args.epoch)?.execute()?;
    print_report(&split, &report);
    Ok(())
}

fn print_report(split: &str, r: &EvalReport) {
    println!("\n{split}: accuracy={:.4}", r.accuracy);
    println!(
        "  strict      p={:.4} r={:.4} f1={:.4}",
        r.strict.precision, r.strict.recall, r.strict.f1
    );
    println!(
        "  loose macro p={:.4} r={:.4} f1={:.4}",
        r.loose_macro.precision, r.loose_macro.recall, r.loose_macro.f1
    );
    println!(
        "  loose micro p={:.4} r={:.4} f1={:.4}",
        r.loose_micro.precision, r.loose_micro.recall, r.loose_micro.f1
    );
}
