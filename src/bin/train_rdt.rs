//! Train a randomized decision tree from a dataset of depth and label
//! images.
//!
//! ```text
//! train_rdt <data dir> <index name> <out file> [OPTIONS]
//! ```
//!
//! The trained tree is written to `<out file>` in the packed `.rdt` format
//! plus a `<out file>.json` rendering. Interrupting with ctrl-c saves a
//! checkpoint that `--continue` picks up later; a second ctrl-c aborts
//! without saving.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use depthtree::{
    io, CancelToken, GatherOptions, TrainData, TrainOptions, TreeTrainer, Verbosity,
};

struct Args {
    data_dir: PathBuf,
    index_name: String,
    out_file: PathBuf,
    limit: u32,
    skip: u32,
    shuffle: bool,
    resume: bool,
    opts: TrainOptions,
}

fn print_usage(to_stderr: bool) {
    let text = "\
Usage: train_rdt <data dir> <index name> <out file> [OPTIONS]
Train a randomised decision tree to infer body-part labels from depth and
label images with a given camera FOV. Default values assume depth data to
be in meters.

  -l, --limit=NUMBER[,NUMBER]   Limit training data to this many images.
                                Optionally, skip the first N images.
  -s, --shuffle                 Shuffle order of training images.
  -p, --pixels=NUMBER           Number of pixels to sample per image.
                                  (default: 2000)
  -t, --thresholds=NUMBER       Number of thresholds to test.
                                  (default: 50)
  -r, --t-range=NUMBER          Range of thresholds to test.
                                  (default: 1.29)
  -c, --combos=NUMBER           Number of UV combinations to test.
                                  (default: 2000)
  -u, --uv-range=NUMBER         Range of UV combinations to test.
                                  (default: 1.29)
  -d, --depth=NUMBER            Depth to train tree to.
                                  (default: 20)
  -m, --threads=NUMBER          Number of threads to use.
                                  (default: autodetect)
  -b, --background=NUMBER       Index of the background label.
                                  (default: 0)
  -n, --seed=NUMBER             Seed to use for RNG.
                                  (default: 0)
  -i, --continue                Continue training from an interrupted run.
  -v, --verbose                 Verbose output.
  -h, --help                    Display this message.";
    if to_stderr {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}

/// Parse the command line. `Ok(None)` means `--help` was handled.
fn parse_args() -> Result<Option<Args>, String> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    // --help wins anywhere, even without the positional arguments.
    if argv.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(None);
    }
    if argv.len() < 3 {
        return Err("expected <data dir> <index name> <out file>".into());
    }

    let mut args = Args {
        data_dir: PathBuf::from(&argv[0]),
        index_name: argv[1].clone(),
        out_file: PathBuf::from(&argv[2]),
        limit: u32::MAX,
        skip: 0,
        shuffle: false,
        resume: false,
        opts: TrainOptions::default(),
    };

    let mut it = argv[3..].iter();
    while let Some(arg) = it.next() {
        // Resolve each option to its short name plus an optional value.
        let (param, mut value): (char, Option<&str>) = if let Some(long) = arg.strip_prefix("--")
        {
            let (name, val) = match long.split_once('=') {
                Some((name, val)) => (name, Some(val)),
                None => (long, None),
            };
            let param = match name {
                "limit" => 'l',
                "shuffle" => 's',
                "pixels" => 'p',
                "thresholds" => 't',
                "t-range" => 'r',
                "combos" => 'c',
                "uv-range" => 'u',
                "depth" => 'd',
                "threads" => 'm',
                "background" => 'b',
                "seed" => 'n',
                "continue" => 'i',
                "verbose" => 'v',
                _ => return Err(format!("unknown option --{name}")),
            };
            (param, val)
        } else if let Some(short) = arg.strip_prefix('-') {
            let mut chars = short.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => (c, None),
                _ => return Err(format!("unknown option {arg}")),
            }
        } else {
            return Err(format!("unexpected argument '{arg}'"));
        };

        // Flags take no value.
        match param {
            's' => {
                args.shuffle = true;
                continue;
            }
            'i' => {
                args.resume = true;
                continue;
            }
            'v' => {
                args.opts.verbosity = Verbosity::Debug;
                continue;
            }
            _ => {}
        }

        // Everything else does; short options read the next argument.
        if value.is_none() {
            value = it.next().map(String::as_str);
        }
        let value = value.ok_or_else(|| format!("option -{param} needs a value"))?;

        fn parse<T: std::str::FromStr>(value: &str, param: char) -> Result<T, String> {
            value
                .parse()
                .map_err(|_| format!("bad value '{value}' for -{param}"))
        }

        match param {
            'l' => {
                let (limit, skip) = match value.split_once(',') {
                    Some((limit, skip)) => (parse(limit, 'l')?, parse(skip, 'l')?),
                    None => (parse(value, 'l')?, 0),
                };
                args.limit = limit;
                args.skip = skip;
            }
            'p' => args.opts.n_pixels = parse(value, param)?,
            't' => args.opts.n_thresholds = parse(value, param)?,
            'r' => args.opts.t_range = parse(value, param)?,
            'c' => args.opts.n_uv = parse(value, param)?,
            'u' => args.opts.uv_range = parse(value, param)?,
            'd' => args.opts.max_depth = parse(value, param)?,
            'm' => args.opts.n_threads = parse(value, param)?,
            'b' => args.opts.background = parse(value, param)?,
            'n' => args.opts.seed = parse(value, param)?,
            _ => return Err(format!("unknown option -{param}")),
        }
    }

    if args.opts.max_depth < 1 || args.opts.max_depth > 30 {
        return Err("depth must be between 1 and 30".into());
    }
    if args.opts.n_uv == 0 || args.opts.n_thresholds == 0 || args.opts.n_pixels == 0 {
        return Err("pixels, thresholds and combos must be non-zero".into());
    }

    Ok(Some(args))
}

fn run(args: Args) -> Result<(), depthtree::Error> {
    let verbose = args.opts.verbosity >= Verbosity::Info;

    if verbose {
        println!("Scanning training directories...");
    }
    let gather = GatherOptions {
        limit: args.limit,
        skip: args.skip,
        shuffle: args.shuffle,
        seed: args.opts.seed,
    };
    let data = TrainData::gather(&args.data_dir, &args.index_name, &gather)?;

    if verbose {
        println!("Preparing training metadata...");
    }
    let background = args.opts.background;
    let mut trainer = TreeTrainer::new(data, args.opts);

    // First ctrl-c requests a clean stop with a checkpoint; a second one
    // aborts immediately.
    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    let seen = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if !seen.swap(true, Ordering::SeqCst) {
            println!("\nUser-triggered interrupt, saving checkpoint...");
            handler_cancel.cancel();
        } else {
            println!("\nInterrupted during checkpoint, quitting!");
            std::process::exit(1);
        }
    })
    .map_err(|e| depthtree::Error::Resource(format!("error installing signal handler: {e}")))?;

    let outcome = if args.resume {
        let checkpoint = io::read_tree(&args.out_file)?;
        trainer.resume(&checkpoint, &cancel)?
    } else {
        trainer.train(&cancel)?
    };

    if verbose {
        println!("Writing output to '{}'...", args.out_file.display());
    }
    io::save_tree(&outcome.tree, &args.out_file)?;

    let json_path: PathBuf = {
        let mut name = args.out_file.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    };
    io::save_tree_json(&outcome.tree, background, Path::new(&json_path))?;

    if verbose {
        println!("{}", if outcome.interrupted { "Interrupted!" } else { "Done!" });
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage(false);
            return ExitCode::SUCCESS;
        }
        Err(msg) => {
            eprintln!("train_rdt: {msg}\n");
            print_usage(true);
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("train_rdt: {err}");
            ExitCode::FAILURE
        }
    }
}
