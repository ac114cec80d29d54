use clap::Parser;
use fluxval::{
    is_sentinel, map_to_geo, ChannelKind, FluxValResult, PixelIndex, ProductHeader,
    SatelliteProduct,
};
use std::path::PathBuf;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Show the header of a flux product.
///
/// Prints the acquisition information, the grid and the band list of a product along with the
/// positions of the grid corners.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "showproduct")]
#[clap(author, version, about)]
struct ShowProductOptions {
    /// The product file, plain or zipped.
    product: PathBuf,

    /// Also decode the bands and summarize their values.
    #[clap(short, long)]
    bands: bool,
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> FluxValResult<()> {
    let opts = ShowProductOptions::parse();

    if opts.bands {
        let product = SatelliteProduct::open(&opts.product)?;
        print_header(product.header());
        print_band_summary(&product);
    } else {
        let header = SatelliteProduct::read_header(&opts.product)?;
        print_header(&header);
    }

    Ok(())
}

fn print_header(header: &ProductHeader) {
    let map = &header.map;

    println!();
    println!("     source - {:>19}", header.source);
    println!("    product - {:>19}", header.product);
    println!("       area - {:>19}", header.area);
    println!("   acquired - {:>19}", header.acquired);
    println!("       size - {:>19}", format!("{} x {}", map.width, map.height));
    println!("    ax / ay - {:>19}", format!("{:.3} / {:.3}", map.ax, map.ay));
    println!("    bx / by - {:>19}", format!("{:.1} / {:.1}", map.bx, map.by));
    println!();

    let corners = [
        ("upper left", 0, 0),
        ("upper right", map.width as i64 - 1, 0),
        ("lower left", 0, map.height as i64 - 1),
        ("lower right", map.width as i64 - 1, map.height as i64 - 1),
    ];
    for (name, col, row) in corners {
        let pos = map_to_geo(map.pixel_center(PixelIndex { col, row }));
        println!("{:>11} - {:>9.4} {:>9.4}", name, pos.lat, pos.lon);
    }
    println!();

    for (i, band) in header.bands.iter().enumerate() {
        println!("   band {:>3} - {:>10} {:?}", i, band.description, band.encoding);
    }
    println!();
}

fn print_band_summary(product: &SatelliteProduct) {
    for channel in product.channels() {
        let mut valid = 0usize;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;

        for row in 0..channel.height() as i64 {
            for col in 0..channel.width() as i64 {
                match channel.value_at(row, col) {
                    Some(v) if !is_sentinel(v) => {
                        valid += 1;
                        min = min.min(v);
                        max = max.max(v);
                    }
                    _ => {}
                }
            }
        }

        let kind = match channel.kind() {
            ChannelKind::Flux => "flux",
            ChannelKind::SolarZenith => "solar zenith",
            ChannelKind::SatelliteZenith => "satellite zenith",
            ChannelKind::RelativeAzimuth => "relative azimuth",
            ChannelKind::CloudMask => "cloud mask",
            ChannelKind::Auxiliary => "",
        };

        if valid > 0 {
            println!(
                "{:>10} {:>16} - {:>8} valid  min {:>9.2}  max {:>9.2}",
                channel.description(),
                kind,
                valid,
                min,
                max
            );
        } else {
            println!("{:>10} {:>16} - no valid data", channel.description(), kind);
        }
    }
    println!();
}
