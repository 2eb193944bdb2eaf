use crate::CLAP_STYLING;
use clap::builder::TypedValueParser;
use clap::{arg, command};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("sleuth")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sleuth")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and progress output")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("scan")
                .about(
                    "Crawl a site within a time budget and report the fraud signals found on \
                its pages.",
                )
                .arg(
                    arg!([DOMAIN])
                        .required(false)
                        .help("Domain or URL to scan (https:// is assumed when no scheme is given)")
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of domains to scan one after another")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("DOMAIN"),
                )
                .arg(
                    arg!(-w --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("Maximum number of page fetches in flight at once")
                        .value_parser(clap::value_parser!(u64).range(1..).map(|n| n as usize))
                        .default_value("4"),
                )
                .arg(
                    arg!(-d --"deadline" <SECONDS>)
                        .required(false)
                        .help("Wall-clock budget for the whole crawl, in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"safety-cap" <NUM>)
                        .required(false)
                        .help(
                            "Hard limit on fetches scheduled at once; extra links are dropped \
                        (raised to --workers when lower)",
                        )
                        .value_parser(clap::value_parser!(u64).range(1..).map(|n| n as usize))
                        .default_value("100"),
                )
                .arg(
                    arg!(--"max-jitter" <MILLIS>)
                        .required(false)
                        .help("Upper bound of the random politeness delay before each fetch")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("1000"),
                )
                .arg(
                    arg!(-c --"catalog" <PATH>)
                        .required(false)
                        .help("JSON indicator catalog overriding the built-in word lists"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("catalog")
                .about("Print the built-in indicator catalog as JSON, ready to edit and pass to --catalog"),
        )
}
