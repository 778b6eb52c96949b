//! Command line definition.

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("voxmix")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Play audio files through the voxmix mixer")
        .arg_required_else_help(true)
        .arg(
            Arg::new("FILE")
                .required(true)
                .help("Music file to play"),
        )
        .arg(
            Arg::new("then")
                .long("then")
                .value_name("FILE")
                .help("Second music file to crossfade into"),
        )
        .arg(
            Arg::new("switch-after")
                .long("switch-after")
                .value_name("SECONDS")
                .value_parser(value_parser!(f64))
                .default_value("10")
                .help("Seconds of the first file before the crossfade starts"),
        )
        .arg(
            Arg::new("crossfade")
                .long("crossfade")
                .short('x')
                .value_name("MS")
                .value_parser(value_parser!(u32))
                .default_value("3000")
                .help("Crossfade length in milliseconds"),
        )
        .arg(
            Arg::new("sfx")
                .long("sfx")
                .value_name("FILE")
                .help("Sound effect decoded fully and played once on a channel"),
        )
        .arg(
            Arg::new("loops")
                .long("loops")
                .short('l')
                .value_name("COUNT")
                .value_parser(value_parser!(i32))
                .default_value("0")
                .help("Extra repeats of the music, -1 for endless"),
        )
        .arg(
            Arg::new("volume")
                .long("volume")
                .short('v')
                .value_name("0-128")
                .value_parser(value_parser!(i32))
                .default_value("128")
                .help("Music volume"),
        )
        .arg(
            Arg::new("fade-in")
                .long("fade-in")
                .value_name("MS")
                .value_parser(value_parser!(u32))
                .help("Fade the music in over this many milliseconds"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .help("JSON file with the mixer configuration"),
        )
        .arg(
            Arg::new("list-devices")
                .long("list-devices")
                .action(ArgAction::SetTrue)
                .exclusive(true)
                .help("List output devices and exit"),
        )
}
