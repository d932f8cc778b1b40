use clap::*;
use orthosnap::libs::fasta::{read_fasta, FastaMap};
use orthosnap::libs::phylo::Tree;
use orthosnap::libs::snap::{
    partition_tree, FileSink, InparalogToKeep, RunContext, RunOutcome, SnapOptions,
};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

// Create clap command arguments
pub fn make_command() -> Command {
    Command::new("orthosnap")
        .version(crate_version!())
        .about("`orthosnap` - Splitter of gene family trees into single-copy orthologous subgroups")
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .after_help(
            r###"
orthosnap identifies subgroups of single-copy orthologous genes (SNAP-OGs)
nested inside a multi-copy gene family tree.

Notes:
* The input tree is midpoint rooted unless --rooted is given.
* Bipartitions with support below the threshold are collapsed before
  duplicate resolution; ~80 suits ultrafast bootstrap approximations
  (UFBoot), ~70 classic bootstrap support.
* Candidate subtrees must contain at least --occupancy distinct taxa
  (default: half of the taxa in the FASTA file, rounded half up).
* Species-specific duplicates (inparalogs) that are sister to one another
  are reduced to a single tip according to --inparalog-to-keep.

Output files:
* <fasta>.orthosnap.<i>.fa        sequences of subgroup i, in tip order
* <fasta>.orthosnap.<i>.tre       subgroup tree (with --snap-trees)
* <fasta>.inparalog_report.txt    kept/discarded tips (with --report-inparalog-handling)

Examples:
1. Default extraction:
   orthosnap -t input.treefile -f input.fa

2. Keep subgroup trees and use a classic bootstrap threshold:
   orthosnap -t input.treefile -f input.fa -s 70 --snap-trees

3. Keep the inparalog closest to the root instead of the longest sequence:
   orthosnap -t input.treefile -f input.fa --inparalog-to-keep shortest_branch_len

"###,
        )
        .arg(
            Arg::new("tree")
                .long("tree")
                .short('t')
                .required(true)
                .num_args(1)
                .help("Input gene family phylogeny in Newick format"),
        )
        .arg(
            Arg::new("fasta")
                .long("fasta")
                .short('f')
                .required(true)
                .num_args(1)
                .help("FASTA file with one sequence per tree tip"),
        )
        .arg(
            Arg::new("support")
                .long("support")
                .short('s')
                .num_args(1)
                .value_parser(value_parser!(f64))
                .default_value("80")
                .help("Support threshold for bipartition collapsing, 0-100"),
        )
        .arg(
            Arg::new("occupancy")
                .long("occupancy")
                .short('o')
                .num_args(1)
                .value_parser(value_parser!(f64))
                .help("Minimum distinct taxa per subgroup [default: taxa/2, rounded half up]"),
        )
        .arg(
            Arg::new("delimiter")
                .long("delimiter")
                .short('d')
                .num_args(1)
                .default_value("|")
                .help("Delimiter between taxon and gene in tip labels"),
        )
        .arg(
            Arg::new("rooted")
                .long("rooted")
                .short('r')
                .action(ArgAction::SetTrue)
                .help("Treat the input tree as rooted; skip midpoint rooting"),
        )
        .arg(
            Arg::new("snap_trees")
                .long("snap-trees")
                .action(ArgAction::SetTrue)
                .help("Also write the Newick tree of each subgroup"),
        )
        .arg(
            Arg::new("inparalog_to_keep")
                .long("inparalog-to-keep")
                .num_args(1)
                .value_parser(builder::PossibleValuesParser::new(InparalogToKeep::NAMES))
                .default_value("longest_seq_len")
                .help("Which sister inparalog to keep"),
        )
        .arg(
            Arg::new("output_path")
                .long("output-path")
                .num_args(1)
                .help("Output directory [default: directory of the FASTA file]"),
        )
        .arg(
            Arg::new("report_inparalog_handling")
                .long("report-inparalog-handling")
                .action(ArgAction::SetTrue)
                .help("Append kept/discarded inparalogs to <fasta>.inparalog_report.txt"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let start = Instant::now();

    let tree_path = args.get_one::<String>("tree").unwrap();
    let fasta_path = args.get_one::<String>("fasta").unwrap();

    if !Path::new(tree_path).is_file() {
        anyhow::bail!("Input tree does not exist: {}", tree_path);
    }
    if !Path::new(fasta_path).is_file() {
        anyhow::bail!("Input fasta does not exist: {}", fasta_path);
    }

    let support = *args.get_one::<f64>("support").unwrap();
    if !(0.0..=100.0).contains(&support) {
        anyhow::bail!("Support threshold must range from 0 to 100, got {}", support);
    }

    let delimiter = args.get_one::<String>("delimiter").unwrap().clone();
    let rooted = args.get_flag("rooted");
    let snap_trees = args.get_flag("snap_trees");
    let report_inparalogs = args.get_flag("report_inparalog_handling");
    let policy = InparalogToKeep::from_name(args.get_one::<String>("inparalog_to_keep").unwrap())
        .unwrap();

    let fasta = read_fasta(fasta_path)?;

    let occupancy = match args.get_one::<f64>("occupancy") {
        Some(&v) => v,
        None => default_occupancy(&fasta, &delimiter),
    };
    if occupancy <= 0.0 {
        anyhow::bail!("Occupancy threshold must be greater than 0, got {}", occupancy);
    }

    let outdir = match args.get_one::<String>("output_path") {
        Some(p) => PathBuf::from(p),
        None => Path::new(fasta_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&outdir)?;

    print_user_args(
        tree_path,
        fasta_path,
        support,
        occupancy,
        rooted,
        snap_trees,
        policy,
        report_inparalogs,
        &outdir,
    );

    //----------------------------
    // Operating
    //----------------------------
    let mut newick = String::new();
    orthosnap::reader(tree_path).read_to_string(&mut newick)?;
    let mut tree = Tree::from_newick(&newick)?;

    if !rooted {
        tree.midpoint_root()?;
    }

    let opts = SnapOptions {
        support,
        occupancy,
        delimiter,
        inparalog_to_keep: policy,
    };
    let mut sink = FileSink::new(&fasta, fasta_path, &outdir, snap_trees, report_inparalogs);
    let mut ctx = RunContext::new();

    let outcome = partition_tree(&tree, &fasta, &opts, &mut sink, &mut ctx)?;

    //----------------------------
    // Output
    //----------------------------
    match outcome {
        RunOutcome::AlreadySingleCopy => {
            println!("Input phylogeny is already a single-copy orthogroup");
            println!("Exiting now...");
        }
        RunOutcome::Partitioned { subgroups } => {
            print_output_stats(&sink, subgroups, snap_trees, start);
        }
    }

    Ok(())
}

/// Default occupancy threshold: half of the unique taxa among the FASTA
/// identifiers, rounded half up.
fn default_occupancy(fasta: &FastaMap, delimiter: &str) -> f64 {
    let unique: HashSet<&str> = fasta
        .keys()
        .map(|id| id.split_once(delimiter).map(|(t, _)| t).unwrap_or(id))
        .collect();
    proper_round(unique.len() as f64 / 2.0)
}

fn proper_round(num: f64) -> f64 {
    if num - num.floor() < 0.5 {
        num.floor()
    } else {
        num.ceil()
    }
}

#[allow(clippy::too_many_arguments)]
fn print_user_args(
    tree: &str,
    fasta: &str,
    support: f64,
    occupancy: f64,
    rooted: bool,
    snap_trees: bool,
    policy: InparalogToKeep,
    report_inparalogs: bool,
    outdir: &Path,
) {
    println!("-------------");
    println!("| Arguments |");
    println!("-------------");
    println!("Input phylogeny: {} (rooted, {})", tree, rooted);
    println!("Input fasta: {}", fasta);
    println!("Inparalog to keep: {}", policy.name());
    println!("Report inparalog handling: {}", report_inparalogs);
    println!("Support threshold: {}", support);
    println!("Taxon occupancy threshold: {}", occupancy);
    println!("Output newick of SNAP-OGs: {}", snap_trees);
    println!("Output directory: {}", outdir.display());
    println!();
}

fn print_output_stats(sink: &FileSink, subgroups: usize, snap_trees: bool, start: Instant) {
    println!();
    println!("---------------------");
    println!("| Output Statistics |");
    println!("---------------------");
    if subgroups > 0 {
        println!(
            "Subgroups of single-copy orthologous genes identified: {}",
            subgroups
        );
        println!("Output files:");
        for i in 0..subgroups {
            println!("\t{}", sink.subgroup_path(i, "fa").display());
            if snap_trees {
                println!("\t{}", sink.subgroup_path(i, "tre").display());
            }
        }
    } else {
        println!("Single-copy orthologous genes identified: 0");
    }
    println!("Execution time: {:.3}s", start.elapsed().as_secs_f64());
}
