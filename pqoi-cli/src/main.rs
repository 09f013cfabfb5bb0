use argh::FromArgs;
use image::{RgbImage, RgbaImage};
use pqoi::{parallel, Channels, Colorspace, QoiDescriptor};

/// pqoi cli encoder and decoder.
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Encode(Encode),
    Decode(Decode),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli { command } = argh::from_env();

    match command {
        Command::Encode(options) => encode(options),
        Command::Decode(options) => decode(options),
    }
}

/// Encodes an image as pqoi.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct Encode {
    /// encode with the block-parallel format on this many workers
    /// (0 = all cores); omit for the canonical serial format
    #[argh(option)]
    workers: Option<usize>,

    /// the input file; PNG, JPG, BMP, or TIFF
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

fn encode(options: Encode) -> Result<(), Box<dyn std::error::Error>> {
    let Encode {
        workers,
        input,
        output,
    } = options;

    let image = image::io::Reader::open(&input)?
        .with_guessed_format()?
        .decode()?;

    let desc = QoiDescriptor {
        width: image.width(),
        height: image.height(),
        channels: Channels::Rgba,
        colorspace: Colorspace::Srgb,
    };
    println!("Encoding {}x{} image", desc.width, desc.height);

    let pixels = image.into_rgba8().into_raw();
    let bytes = match workers {
        Some(workers) => parallel::encode_to_vec(&pixels, &desc, workers)?,
        None => pqoi::encode_to_vec(&pixels, &desc)?,
    };

    std::fs::write(&output, &bytes)?;
    println!("Written {} bytes to `{output}`", bytes.len());

    Ok(())
}

/// Decodes a pqoi image (either format) into PNG, JPG, BMP, or TIFF.
#[derive(FromArgs)]
#[argh(subcommand, name = "decode")]
struct Decode {
    /// decode on this many workers when the stream is block-parallel
    /// (0 = all cores)
    #[argh(option, default = "0")]
    workers: usize,

    /// the input file
    #[argh(positional)]
    input: String,
    /// the output file; format chosen by extension
    #[argh(positional)]
    output: String,
}

fn decode(options: Decode) -> Result<(), Box<dyn std::error::Error>> {
    let Decode {
        workers,
        input,
        output,
    } = options;

    let data = std::fs::read(&input)?;
    println!("Decoding `{input}`");

    let (desc, pixels) = if parallel::is_extended(&data)? {
        parallel::decode_to_vec(&data, None, workers)?
    } else {
        pqoi::decode_to_vec(&data, None)?
    };

    match desc.channels {
        Channels::Rgba => RgbaImage::from_raw(desc.width, desc.height, pixels)
            .ok_or("failed to assemble image")?
            .save(&output)?,
        Channels::Rgb => RgbImage::from_raw(desc.width, desc.height, pixels)
            .ok_or("failed to assemble image")?
            .save(&output)?,
    }

    println!("Written {}x{} image to `{output}`", desc.width, desc.height);

    Ok(())
}
