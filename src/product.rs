/*!
 * Decoding of satellite flux products.
 *
 * A product is a short text header followed by the band payloads. The header is line oriented,
 * one `key value` pair per line, and closed by a line containing only `end`:
 *
 * ```text
 * FLUXVAL-PRODUCT 1
 * source NOAA-19
 * product SSI
 * area ns
 * time 2020-06-15T12:05
 * size 200 150
 * ax 1.5
 * ay 1.5
 * bx -150.0
 * by -2500.0
 * band SSI f32
 * band CM u16
 * end
 * ```
 *
 * Each band follows in order as width * height little endian values of the listed type. A
 * product may also be stored alone in a zip archive.
 */

use crate::{
    error::{FluxValError, FluxValResult},
    geo::MapReference,
};
use chrono::NaiveDateTime;
use std::{
    fs::File,
    io::{BufRead, BufReader, Cursor, Read, Write},
    path::Path,
};

const MAGIC: &str = "FLUXVAL-PRODUCT";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// The physical meaning of a band, which decides how a window of it is reduced to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// The radiative flux estimate.
    Flux,
    SolarZenith,
    SatelliteZenith,
    RelativeAzimuth,
    /// Cloud type codes, converted to float.
    CloudMask,
    /// Anything else, copied through untouched.
    Auxiliary,
}

impl ChannelKind {
    /// Assign a kind to a band from its position and description.
    ///
    /// The flux is always the first band and the viewing geometry always sits in bands 3 to 5.
    /// The cloud mask is only recognized by its description.
    fn for_band(index: usize, description: &str) -> ChannelKind {
        use ChannelKind::*;

        if description == "CM" {
            return CloudMask;
        }

        match index {
            0 => Flux,
            3 => SolarZenith,
            4 => SatelliteZenith,
            5 => RelativeAzimuth,
            _ => Auxiliary,
        }
    }

    /// The viewing geometry kinds, in output order.
    pub const GEOMETRY: [ChannelKind; 3] = [
        ChannelKind::SolarZenith,
        ChannelKind::SatelliteZenith,
        ChannelKind::RelativeAzimuth,
    ];
}

/// One band of a decoded product.
#[derive(Debug, Clone)]
pub struct Channel {
    description: String,
    kind: ChannelKind,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Channel {
    /// Create a channel, the data must be width * height values in row major order.
    pub fn new(
        description: &str,
        kind: ChannelKind,
        width: usize,
        height: usize,
        data: Vec<f32>,
    ) -> FluxValResult<Self> {
        if data.len() != width * height {
            return Err(FluxValError::MalformedProduct(format!(
                "band {} has {} values, expected {}x{}",
                description,
                data.len(),
                width,
                height
            )));
        }

        Ok(Channel {
            description: description.to_owned(),
            kind,
            width,
            height,
            data,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Get the value of a cell, or None if the cell is not on the grid.
    pub fn value_at(&self, row: i64, col: i64) -> Option<f32> {
        if row < 0 || col < 0 || row as usize >= self.height || col as usize >= self.width {
            return None;
        }

        self.data.get(row as usize * self.width + col as usize).copied()
    }
}

/// How the values of a band are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandEncoding {
    F32,
    U16,
}

impl BandEncoding {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "f32" => Some(BandEncoding::F32),
            "u16" => Some(BandEncoding::U16),
            _ => None,
        }
    }

    fn value_size(self) -> usize {
        match self {
            BandEncoding::F32 => 4,
            BandEncoding::U16 => 2,
        }
    }
}

/// Description of a band as listed in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandInfo {
    pub description: String,
    pub encoding: BandEncoding,
}

/// Everything about a product except the band data.
#[derive(Debug, Clone)]
pub struct ProductHeader {
    /// Satellite or processing chain the product comes from.
    pub source: String,
    /// Product identifier, e.g. SSI or DLI.
    pub product: String,
    /// Area tag.
    pub area: String,
    /// Representative acquisition time (UTC).
    pub acquired: NaiveDateTime,
    /// Grid geometry.
    pub map: MapReference,
    /// Bands in storage order.
    pub bands: Vec<BandInfo>,
}

/// A fully decoded product.
#[derive(Debug, Clone)]
pub struct SatelliteProduct {
    header: ProductHeader,
    channels: Vec<Channel>,
    /// Original file name the product was loaded from.
    fname: String,
}

impl SatelliteProduct {
    /// Open a product file, either a bare product or a zip archive holding one.
    pub fn open<P: AsRef<Path>>(path: P) -> FluxValResult<Self> {
        let p: &Path = path.as_ref();
        let fname = file_name(p)?;

        let buf = read_product_bytes(p)?;
        Self::decode(&buf, fname)
    }

    /// Read only the header of a product file.
    pub fn read_header<P: AsRef<Path>>(path: P) -> FluxValResult<ProductHeader> {
        let p: &Path = path.as_ref();

        if is_zip(p) {
            let buf = read_product_bytes(p)?;
            let mut cursor = Cursor::new(buf.as_slice());
            parse_header(&mut cursor)
        } else {
            let mut reader = BufReader::new(File::open(p)?);
            parse_header(&mut reader)
        }
    }

    /// Decode a product from memory.
    pub fn decode(buf: &[u8], fname: String) -> FluxValResult<Self> {
        let mut cursor = Cursor::new(buf);
        let header = parse_header(&mut cursor)?;

        let width = header.map.width;
        let height = header.map.height;
        let npix = width.checked_mul(height).ok_or_else(|| {
            FluxValError::MalformedProduct(format!(
                "{}: grid size {} x {} is too large",
                fname, width, height
            ))
        })?;

        let mut offset = cursor.position() as usize;
        let mut channels = Vec::with_capacity(header.bands.len());
        for (i, band) in header.bands.iter().enumerate() {
            let truncated = || {
                FluxValError::MalformedProduct(format!(
                    "{}: band {} ({}) is truncated",
                    fname, i, band.description
                ))
            };

            let end = npix
                .checked_mul(band.encoding.value_size())
                .and_then(|nbytes| offset.checked_add(nbytes))
                .ok_or_else(truncated)?;
            let payload = buf.get(offset..end).ok_or_else(truncated)?;
            offset = end;

            let data: Vec<f32> = match band.encoding {
                BandEncoding::F32 => payload
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
                BandEncoding::U16 => payload
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32)
                    .collect(),
            };

            let kind = ChannelKind::for_band(i, &band.description);
            channels.push(Channel::new(&band.description, kind, width, height, data)?);
        }

        if offset != buf.len() {
            log::debug!(
                "{}: {} trailing bytes after the last band",
                fname,
                buf.len() - offset
            );
        }

        Ok(SatelliteProduct {
            header,
            channels,
            fname,
        })
    }

    /// Assemble a product from a header and its bands.
    ///
    /// The bands must match the band list of the header and the grid size.
    pub fn from_parts(
        header: ProductHeader,
        channels: Vec<Channel>,
        fname: String,
    ) -> FluxValResult<Self> {
        if channels.len() != header.bands.len() {
            return Err(FluxValError::MalformedProduct(format!(
                "{}: header lists {} bands, got {}",
                fname,
                header.bands.len(),
                channels.len()
            )));
        }

        for (band, channel) in header.bands.iter().zip(&channels) {
            if band.description != channel.description
                || channel.width != header.map.width
                || channel.height != header.map.height
            {
                return Err(FluxValError::MalformedProduct(format!(
                    "{}: band {} does not match the header",
                    fname, channel.description
                )));
            }
        }

        Ok(SatelliteProduct {
            header,
            channels,
            fname,
        })
    }

    /// Write the product in the container format [open](Self::open) reads.
    ///
    /// Bands stored as u16 must hold whole numbers in the u16 range, nothing is written otherwise.
    pub fn write<W: Write>(&self, mut out: W) -> FluxValResult<()> {
        let h = &self.header;

        for (band, channel) in h.bands.iter().zip(&self.channels) {
            if band.encoding != BandEncoding::U16 {
                continue;
            }

            let bad = channel
                .data
                .iter()
                .find(|v| v.fract() != 0.0 || **v < 0.0 || **v > u16::MAX as f32);
            if let Some(v) = bad {
                return Err(FluxValError::MalformedProduct(format!(
                    "{}: band {} holds {}, which is not a u16 code",
                    self.fname, band.description, v
                )));
            }
        }

        writeln!(out, "{} 1", MAGIC)?;
        writeln!(out, "source {}", h.source)?;
        writeln!(out, "product {}", h.product)?;
        writeln!(out, "area {}", h.area)?;
        writeln!(out, "time {}", h.acquired.format(TIME_FORMAT))?;
        writeln!(out, "size {} {}", h.map.width, h.map.height)?;
        writeln!(out, "ax {}", h.map.ax)?;
        writeln!(out, "ay {}", h.map.ay)?;
        writeln!(out, "bx {}", h.map.bx)?;
        writeln!(out, "by {}", h.map.by)?;
        for band in &h.bands {
            let tag = match band.encoding {
                BandEncoding::F32 => "f32",
                BandEncoding::U16 => "u16",
            };
            writeln!(out, "band {} {}", band.description, tag)?;
        }
        writeln!(out, "end")?;

        for (band, channel) in h.bands.iter().zip(&self.channels) {
            for v in &channel.data {
                match band.encoding {
                    BandEncoding::F32 => out.write_all(&v.to_le_bytes())?,
                    BandEncoding::U16 => out.write_all(&(*v as u16).to_le_bytes())?,
                }
            }
        }

        Ok(())
    }

    pub fn header(&self) -> &ProductHeader {
        &self.header
    }

    pub fn file_name(&self) -> &str {
        &self.fname
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Get the first channel of a given kind.
    pub fn channel(&self, kind: ChannelKind) -> Option<&Channel> {
        self.channels.iter().find(|c| c.kind == kind)
    }
}

fn file_name(p: &Path) -> FluxValResult<String> {
    p.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .ok_or_else(|| {
            FluxValError::Io(std::io::Error::from(std::io::ErrorKind::InvalidInput))
        })
}

fn is_zip(p: &Path) -> bool {
    p.extension().map(|ext| ext == "zip").unwrap_or(false)
}

fn read_product_bytes(p: &Path) -> FluxValResult<Vec<u8>> {
    let file = File::open(p)?;

    if is_zip(p) {
        let mut zip = zip::ZipArchive::new(file)?;
        if zip.len() != 1 {
            return Err(FluxValError::MalformedProduct(format!(
                "{} holds {} files, expected exactly one product",
                p.display(),
                zip.len()
            )));
        }

        let mut product_file = zip.by_index(0)?;
        let mut buf: Vec<u8> = Vec::with_capacity(product_file.size() as usize);
        product_file.read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        let mut buf = Vec::new();
        BufReader::new(file).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

fn parse_header<R: BufRead>(reader: &mut R) -> FluxValResult<ProductHeader> {
    let malformed = |msg: String| FluxValError::MalformedProduct(msg);

    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut magic = line.split_whitespace();
    if magic.next() != Some(MAGIC) {
        return Err(malformed(format!("not a flux product: {}", line.trim())));
    }
    if magic.next() != Some("1") {
        return Err(malformed(format!("unsupported version: {}", line.trim())));
    }

    let mut source = None;
    let mut product = None;
    let mut area = None;
    let mut acquired = None;
    let mut size = None;
    let (mut ax, mut ay, mut bx, mut by) = (None, None, None, None);
    let mut bands = vec![];

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(malformed("header is not terminated".to_owned()));
        }

        let mut tokens = line.split_whitespace();
        let key = match tokens.next() {
            Some(key) => key,
            None => continue,
        };
        let rest: Vec<&str> = tokens.collect();

        let parse_f64 = |rest: &[&str]| -> FluxValResult<f64> {
            rest.first()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed(format!("invalid value for {}", key)))
        };

        match key {
            "end" => break,
            "source" => source = rest.first().map(|s| s.to_string()),
            "product" => product = rest.first().map(|s| s.to_string()),
            "area" => area = rest.first().map(|s| s.to_string()),
            "time" => {
                let t = rest.first().ok_or_else(|| malformed("missing time".to_owned()))?;
                let t = NaiveDateTime::parse_from_str(t, TIME_FORMAT)
                    .map_err(|err| malformed(format!("invalid time {}: {}", t, err)))?;
                acquired = Some(t);
            }
            "size" => {
                let dims: Vec<usize> = rest.iter().filter_map(|v| v.parse().ok()).collect();
                if dims.len() != 2 || dims[0] == 0 || dims[1] == 0 {
                    return Err(malformed(format!("invalid size: {}", line.trim())));
                }
                size = Some((dims[0], dims[1]));
            }
            "ax" => ax = Some(parse_f64(&rest)?),
            "ay" => ay = Some(parse_f64(&rest)?),
            "bx" => bx = Some(parse_f64(&rest)?),
            "by" => by = Some(parse_f64(&rest)?),
            "band" => {
                if rest.len() != 2 {
                    return Err(malformed(format!("invalid band: {}", line.trim())));
                }
                let encoding = BandEncoding::from_tag(rest[1])
                    .ok_or_else(|| malformed(format!("unknown band type {}", rest[1])))?;
                bands.push(BandInfo {
                    description: rest[0].to_owned(),
                    encoding,
                });
            }
            other => log::debug!("ignoring unknown header key {}", other),
        }
    }

    let missing = |what: &str| malformed(format!("header is missing {}", what));

    let (width, height) = size.ok_or_else(|| missing("size"))?;
    let map = MapReference {
        ax: ax.ok_or_else(|| missing("ax"))?,
        ay: ay.ok_or_else(|| missing("ay"))?,
        bx: bx.ok_or_else(|| missing("bx"))?,
        by: by.ok_or_else(|| missing("by"))?,
        width,
        height,
    };

    if bands.is_empty() {
        return Err(missing("bands"));
    }

    Ok(ProductHeader {
        source: source.ok_or_else(|| missing("source"))?,
        product: product.ok_or_else(|| missing("product"))?,
        area: area.ok_or_else(|| missing("area"))?,
        acquired: acquired.ok_or_else(|| missing("time"))?,
        map,
        bands,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(header: &str, bands: &[(BandEncoding, Vec<f32>)]) -> Vec<u8> {
        let mut buf = header.as_bytes().to_vec();
        for (encoding, values) in bands {
            for v in values {
                match encoding {
                    BandEncoding::F32 => buf.extend_from_slice(&v.to_le_bytes()),
                    BandEncoding::U16 => buf.extend_from_slice(&(*v as u16).to_le_bytes()),
                }
            }
        }
        buf
    }

    const HEADER: &str = concat!(
        "FLUXVAL-PRODUCT 1\n",
        "source NOAA-19\n",
        "product SSI\n",
        "area ns\n",
        "time 2020-06-15T12:05\n",
        "size 3 2\n",
        "ax 1.5\n",
        "ay 1.5\n",
        "bx -10.0\n",
        "by -3000.0\n",
        "band SSI f32\n",
        "band CM u16\n",
        "end\n",
    );

    #[test]
    fn test_decode() {
        let buf = encode(
            HEADER,
            &[
                (BandEncoding::F32, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.5]),
                (BandEncoding::U16, vec![1.0, 1.0, 5.0, 5.0, 0.0, 19.0]),
            ],
        );

        let product = SatelliteProduct::decode(&buf, "test.flx".to_owned()).unwrap();
        let header = product.header();
        assert_eq!(header.source, "NOAA-19");
        assert_eq!(header.area, "ns");
        assert_eq!(header.acquired.format("%Y%m%d%H%M").to_string(), "202006151205");
        assert_eq!(header.map.width, 3);
        assert_eq!(header.map.height, 2);
        assert_eq!(header.map.by, -3000.0);

        let flux = product.channel(ChannelKind::Flux).unwrap();
        assert_eq!(flux.value_at(1, 2), Some(6.5));
        assert_eq!(flux.value_at(2, 0), None);

        let cm = product.channel(ChannelKind::CloudMask).unwrap();
        assert_eq!(cm.description(), "CM");
        assert_eq!(cm.value_at(1, 2), Some(19.0));

        assert!(product.channel(ChannelKind::SolarZenith).is_none());
    }

    #[test]
    fn test_truncated() {
        let buf = encode(
            HEADER,
            &[
                (BandEncoding::F32, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.5]),
                (BandEncoding::U16, vec![1.0, 1.0]),
            ],
        );

        let res = SatelliteProduct::decode(&buf, "test.flx".to_owned());
        assert!(matches!(res, Err(FluxValError::MalformedProduct(_))));
    }

    #[test]
    fn test_bad_header() {
        let res = SatelliteProduct::decode(b"HDF5\n", "test.flx".to_owned());
        assert!(matches!(res, Err(FluxValError::MalformedProduct(_))));

        let no_end = HEADER.replace("end\n", "");
        let res = SatelliteProduct::decode(no_end.as_bytes(), "test.flx".to_owned());
        assert!(matches!(res, Err(FluxValError::MalformedProduct(_))));

        let no_map = HEADER.replace("ax 1.5\n", "");
        let res = SatelliteProduct::decode(no_map.as_bytes(), "test.flx".to_owned());
        assert!(matches!(res, Err(FluxValError::MalformedProduct(_))));

        // Sizes too large to address are rejected, not overflowed.
        for size in ["size 4611686018427387904 4\n", "size 1 4611686018427387904\n"] {
            let huge = HEADER.replace("size 3 2\n", size);
            let res = SatelliteProduct::decode(huge.as_bytes(), "test.flx".to_owned());
            assert!(matches!(res, Err(FluxValError::MalformedProduct(_))));
        }
    }

    #[test]
    fn test_write_rejects_fractional_codes() {
        let buf = encode(
            HEADER,
            &[
                (BandEncoding::F32, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.5]),
                (BandEncoding::U16, vec![1.0, 1.0, 5.0, 5.0, 0.0, 19.0]),
            ],
        );
        let product = SatelliteProduct::decode(&buf, "test.flx".to_owned()).unwrap();
        let header = product.header().clone();

        for code in [2.5, -1.0, 70000.0] {
            let mut channels = product.channels().to_vec();
            channels[1] = Channel::new(
                "CM",
                ChannelKind::CloudMask,
                3,
                2,
                vec![1.0, code, 5.0, 5.0, 0.0, 19.0],
            )
            .unwrap();
            let bad =
                SatelliteProduct::from_parts(header.clone(), channels, "bad.flx".to_owned())
                    .unwrap();

            let mut written = vec![];
            let res = bad.write(&mut written);
            assert!(matches!(res, Err(FluxValError::MalformedProduct(_))));
            assert!(written.is_empty());
        }

        // Fractional values in f32 bands are fine.
        let mut written = vec![];
        product.write(&mut written).unwrap();
        let reread = SatelliteProduct::decode(&written, "test.flx".to_owned()).unwrap();
        assert_eq!(reread.channels()[0].value_at(1, 2), Some(6.5));
        assert_eq!(reread.channels()[1].value_at(1, 2), Some(19.0));
    }

    #[test]
    fn test_write_and_open_zip() {
        let buf = encode(
            HEADER,
            &[
                (BandEncoding::F32, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.5]),
                (BandEncoding::U16, vec![1.0, 1.0, 5.0, 5.0, 0.0, 19.0]),
            ],
        );
        let product = SatelliteProduct::decode(&buf, "test.flx".to_owned()).unwrap();

        let mut written = vec![];
        product.write(&mut written).unwrap();
        let reread = SatelliteProduct::decode(&written, "test.flx".to_owned()).unwrap();
        assert_eq!(reread.header().map, product.header().map);
        assert_eq!(reread.header().bands, product.header().bands);
        assert_eq!(reread.header().acquired, product.header().acquired);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssi_noaa19_202006151205_ns.zip");
        {
            let file = File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("ssi_noaa19_202006151205_ns.flx", zip::write::FileOptions::default())
                .unwrap();
            product.write(&mut zip).unwrap();
            zip.finish().unwrap();
        }

        let header = SatelliteProduct::read_header(&path).unwrap();
        assert_eq!(header.bands.len(), 2);

        let opened = SatelliteProduct::open(&path).unwrap();
        assert_eq!(opened.file_name(), "ssi_noaa19_202006151205_ns.zip");
        assert_eq!(
            opened.channel(ChannelKind::CloudMask).unwrap().value_at(0, 2),
            Some(5.0)
        );
    }

    #[test]
    fn test_from_parts() {
        let buf = encode(
            HEADER,
            &[
                (BandEncoding::F32, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.5]),
                (BandEncoding::U16, vec![1.0, 1.0, 5.0, 5.0, 0.0, 19.0]),
            ],
        );
        let product = SatelliteProduct::decode(&buf, "test.flx".to_owned()).unwrap();
        let header = product.header().clone();

        let res = SatelliteProduct::from_parts(
            header.clone(),
            product.channels()[..1].to_vec(),
            "short.flx".to_owned(),
        );
        assert!(matches!(res, Err(FluxValError::MalformedProduct(_))));

        let rebuilt =
            SatelliteProduct::from_parts(header, product.channels().to_vec(), "x.flx".to_owned())
                .unwrap();
        assert_eq!(rebuilt.channels().len(), 2);
    }

    #[test]
    fn test_channel_kinds() {
        let kinds: Vec<ChannelKind> = ["SSI", "SSI_ERR", "QC", "SOZ", "SAZ", "RAZ", "CM"]
            .iter()
            .enumerate()
            .map(|(i, d)| ChannelKind::for_band(i, d))
            .collect();

        assert_eq!(
            kinds,
            vec![
                ChannelKind::Flux,
                ChannelKind::Auxiliary,
                ChannelKind::Auxiliary,
                ChannelKind::SolarZenith,
                ChannelKind::SatelliteZenith,
                ChannelKind::RelativeAzimuth,
                ChannelKind::CloudMask,
            ]
        );
    }
}
