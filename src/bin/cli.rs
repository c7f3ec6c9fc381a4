use clap::{App, Arg, ArgMatches, SubCommand};
use blobmap::{
    container::{Container, ContainerWriter, WriterConfig, DEFAULT_SEGMENT_ALIGNMENT},
    error::BlobMapError,
    loaders::{open_loader, LoadStrategy, LoaderConfig, MlockConfig},
    Result,
};
use std::{fs, path::PathBuf};

fn main() -> Result<()> {
    env_logger::init();

    let default_alignment = DEFAULT_SEGMENT_ALIGNMENT.to_string();
    let matches = App::new("blobmap-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Pack and inspect named-data containers")
        .subcommand(
            SubCommand::with_name("pack")
                .about("Build a container from files")
                .arg(
                    Arg::with_name("out")
                        .short("o")
                        .long("out")
                        .value_name("FILE")
                        .help("Container file to write")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("entry")
                        .short("e")
                        .long("entry")
                        .value_name("KEY=PATH")
                        .help("Store the contents of PATH under KEY")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1),
                )
                .arg(
                    Arg::with_name("alias")
                        .short("a")
                        .long("alias")
                        .value_name("KEY=INDEX")
                        .help("Point KEY at an existing segment index")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1),
                )
                .arg(
                    Arg::with_name("align")
                        .long("align")
                        .value_name("BYTES")
                        .help("Segment alignment (power of two)")
                        .default_value(&default_alignment)
                        .takes_value(true),
                ),
        )
        .subcommand(
            loader_args(
                SubCommand::with_name("list").about("List keys with their byte ranges"),
            ),
        )
        .subcommand(
            loader_args(
                SubCommand::with_name("get")
                    .about("Load one named entry")
                    .arg(
                        Arg::with_name("key")
                            .help("Key to load")
                            .required(true)
                            .index(2),
                    )
                    .arg(
                        Arg::with_name("out")
                            .short("o")
                            .long("out")
                            .value_name("FILE")
                            .help("Write the loaded bytes to FILE")
                            .takes_value(true),
                    ),
            ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show version and build information"),
        )
        .get_matches();

    match matches.subcommand() {
        ("pack", Some(pack_matches)) => handle_pack(pack_matches),
        ("list", Some(list_matches)) => handle_list(list_matches),
        ("get", Some(get_matches)) => handle_get(get_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn loader_args<'a, 'b>(command: App<'a, 'b>) -> App<'a, 'b> {
    command
        .arg(
            Arg::with_name("file")
                .help("Container file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("loader")
                .short("l")
                .long("loader")
                .value_name("STRATEGY")
                .help("How to read the container")
                .possible_values(&["file", "mmap"])
                .default_value("mmap")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("mlock")
                .long("mlock")
                .help("Lock loaded ranges in memory (mmap only, errors ignored)"),
        )
}

fn required<'m>(matches: &'m ArgMatches, name: &str) -> Result<&'m str> {
    matches
        .value_of(name)
        .ok_or_else(|| BlobMapError::invalid_argument(name, "missing required argument"))
}

fn split_pair<'s>(value: &'s str, parameter: &str) -> Result<(&'s str, &'s str)> {
    value.split_once('=').ok_or_else(|| {
        BlobMapError::invalid_argument(parameter, format!("expected KEY=VALUE, got '{}'", value))
    })
}

fn loader_config(matches: &ArgMatches) -> Result<LoaderConfig> {
    let strategy = LoadStrategy::from_name(required(matches, "loader")?)?;
    let mlock = if matches.is_present("mlock") {
        MlockConfig::UseMlockIgnoreErrors
    } else {
        MlockConfig::NoMlock
    };
    Ok(LoaderConfig::new(required(matches, "file")?)
        .with_strategy(strategy)
        .with_mlock(mlock))
}

fn handle_pack(matches: &ArgMatches) -> Result<()> {
    let out = PathBuf::from(required(matches, "out")?);
    let alignment: u64 = required(matches, "align")?
        .parse()
        .map_err(|_| BlobMapError::invalid_argument("align", "Invalid alignment"))?;

    let mut writer = ContainerWriter::new(WriterConfig::default().with_segment_alignment(alignment))?;

    for entry in matches.values_of("entry").into_iter().flatten() {
        let (key, path) = split_pair(entry, "entry")?;
        let data = fs::read(path).map_err(|e| BlobMapError::from_io(e, path))?;
        let segment = writer.add_data(key, data)?;
        println!("  + {} -> segment {}", key, segment);
    }

    for alias in matches.values_of("alias").into_iter().flatten() {
        let (key, index) = split_pair(alias, "alias")?;
        let index: u32 = index
            .parse()
            .map_err(|_| BlobMapError::invalid_argument("alias", "Invalid segment index"))?;
        writer.add_alias(key, index)?;
        println!("  + {} -> segment {} (alias)", key, index);
    }

    let written = writer.write_file(&out)?;
    println!(
        "Wrote '{}': {} entries, {} segments, {} bytes",
        out.display(),
        writer.num_entries(),
        writer.num_segments(),
        written
    );
    Ok(())
}

fn handle_list(matches: &ArgMatches) -> Result<()> {
    let loader = open_loader(&loader_config(matches)?)?;
    let container = Container::load(loader.as_ref())?;
    let tables = container.tables()?;

    let map = match container.named_data_map(&tables) {
        Ok(map) => map,
        Err(e) if e.is_invalid_argument() => {
            println!("No named data found");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    println!("Segment base offset: {}", container.segment_base_offset());
    println!("Named data ({} keys):", map.get_num_keys());
    for key in map.keys() {
        let key = key?;
        let segment = map.get_segment(key)?;
        println!(
            "  - {:<40} offset {:>12}  size {:>12}",
            key, segment.offset, segment.size
        );
    }
    Ok(())
}

fn handle_get(matches: &ArgMatches) -> Result<()> {
    let loader = open_loader(&loader_config(matches)?)?;
    let key = required(matches, "key")?;

    let container = Container::load(loader.as_ref())?;
    let tables = container.tables()?;
    let map = container.named_data_map(&tables)?;

    let start = std::time::Instant::now();
    let mut buffer = map.get_data(key)?;
    let elapsed = start.elapsed();

    println!(
        "Loaded '{}': {} bytes in {:.2}μs",
        key,
        buffer.size(),
        elapsed.as_secs_f64() * 1_000_000.0
    );

    if let Some(out) = matches.value_of("out") {
        fs::write(out, buffer.data()).map_err(|e| BlobMapError::from_io(e, out))?;
        println!("Wrote {} bytes to '{}'", buffer.size(), out);
    }

    buffer.free();
    Ok(())
}

fn show_info() -> Result<()> {
    println!("blobmap {}", blobmap::VERSION);
    println!("  Container header: {} bytes", blobmap::container::HEADER_SIZE);
    println!(
        "  Metadata schema version: {}",
        blobmap::container::schema::SCHEMA_VERSION
    );
    println!("  Default segment alignment: {} bytes", DEFAULT_SEGMENT_ALIGNMENT);
    Ok(())
}
