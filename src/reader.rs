//! Loaders for the plain-text input files
//!
//! All loaders work on any [`BufRead`] stream. Everything after a `#` on a
//! line is ignored.
use std::io::BufRead;
use std::str::FromStr;

use thiserror::Error;

use crate::error::Error;
use crate::histogram::{Axis, Graph, Hist1D, Hist2D};
use crate::species::{LineshapeKind, Species, SpeciesTable};
use crate::vertex::BeamConditions;

/// Marker for a self-conjugate species or a missing lineshape
const NONE_MARKER: &str = "---";

#[derive(Debug, Error)]
pub(crate) enum ParseError {
    #[error("Missing entry '{0}'")]
    MissingEntry(String),
    #[error("Failed to convert '{text}' for entry '{name}'")]
    ConversionError { name: String, text: String },
    #[error("Expected a line starting with '{expected}', found '{found}'")]
    BadHeader { expected: &'static str, found: String },
    #[error("Unknown lineshape '{0}', expected 'RBW', 'GS' or '---'")]
    UnknownLineshape(String),
    #[error("Found {0} after the last expected entry")]
    TrailingEntries(String),
    #[error("Reached end of input while reading {0}")]
    EndOfFile(&'static str),
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}

pub(crate) fn parse<T: FromStr>(name: &str, text: Option<&str>) -> Result<T, ParseError> {
    let text = text.ok_or_else(|| ParseError::MissingEntry(name.to_owned()))?;
    text.parse::<T>().map_err(|_| ParseError::ConversionError {
        name: name.to_owned(),
        text: text.to_owned(),
    })
}

pub(crate) fn parse_f64(name: &str, text: Option<&str>) -> Result<f64, ParseError> {
    let text = text.ok_or_else(|| ParseError::MissingEntry(name.to_owned()))?;
    fast_float::parse(text).map_err(|_| ParseError::ConversionError {
        name: name.to_owned(),
        text: text.to_owned(),
    })
}

pub(crate) fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Read the remaining lines, dropping comments and blank lines
fn content_lines<T: BufRead>(stream: T) -> Result<Vec<String>, Error> {
    let mut lines = Vec::new();
    for line in stream.lines() {
        let line = line?;
        let line = strip_comment(&line).trim();
        if !line.is_empty() {
            lines.push(line.to_owned());
        }
    }
    Ok(lines)
}

/// Read a species table
///
/// The first line is a title. Each following line holds the columns
///
/// ```text
/// ID name antiname mass width charge spin lineshape ctau
/// ```
///
/// with masses and widths in GeV and `ctau` in mm. Unless the antiname is
/// `---`, the antiparticle is added with negated id and charge.
///
/// # Example
///
/// ```rust,no_run
/// let file = std::fs::File::open("particles.dat").unwrap();
/// let species = decaysim::read_species(std::io::BufReader::new(file)).unwrap();
/// println!("Loaded {} species", species.len());
/// ```
pub fn read_species<T: BufRead>(mut stream: T) -> Result<SpeciesTable, Error> {
    let mut title = String::new();
    if stream.read_line(&mut title)? == 0 {
        return Err(ParseError::EndOfFile("species table title").into());
    }
    let mut table = SpeciesTable::new();
    for line in content_lines(stream)? {
        let mut entries = line.split_whitespace();
        let id = parse::<i32>("ID", entries.next())?;
        let name = parse::<String>("name", entries.next())?;
        let anti = parse::<String>("antiname", entries.next())?;
        let mass = parse_f64("mass", entries.next())?;
        let width = parse_f64("width", entries.next())?;
        let charge = parse_f64("charge", entries.next())?;
        let spin = parse_f64("spin", entries.next())?;
        let lineshape = parse_lineshape(entries.next())?;
        let ctau = parse_f64("ctau", entries.next())?;
        if let Some(extra) = entries.next() {
            return Err(ParseError::TrailingEntries(extra.to_owned()).into());
        }
        let species = Species {
            id,
            name,
            mass,
            width,
            charge,
            spin,
            lineshape,
            ctau,
        };
        if anti != NONE_MARKER {
            table.insert(Species {
                id: -id,
                name: anti,
                charge: -charge,
                ..species.clone()
            });
        }
        table.insert(species);
    }
    tracing::info!("Loaded {} particle species", table.len());
    Ok(table)
}

fn parse_lineshape(text: Option<&str>) -> Result<Option<LineshapeKind>, ParseError> {
    match text {
        None => Err(ParseError::MissingEntry("lineshape".to_owned())),
        Some(NONE_MARKER) => Ok(None),
        Some("RBW") => Ok(Some(LineshapeKind::RelativisticBreitWigner)),
        Some("GS") => Ok(Some(LineshapeKind::GounarisSakurai)),
        Some(other) => Err(ParseError::UnknownLineshape(other.to_owned())),
    }
}

/// Whitespace-separated values following a header line
struct Table {
    header: Vec<String>,
    values: Vec<String>,
}

fn read_table<T: BufRead>(stream: T, expected: &'static str) -> Result<Table, Error> {
    let lines = content_lines(stream)?;
    let mut lines = lines.iter();
    let header = lines
        .next()
        .ok_or(ParseError::EndOfFile("histogram header"))?;
    let header: Vec<String> = header.split_whitespace().map(str::to_owned).collect();
    if header.first().map(String::as_str) != Some(expected) {
        return Err(ParseError::BadHeader {
            expected,
            found: header.join(" "),
        }
        .into());
    }
    let values = lines
        .flat_map(|line| line.split_whitespace())
        .map(str::to_owned)
        .collect();
    Ok(Table { header, values })
}

impl Table {
    fn header_entry(&self, idx: usize) -> Option<&str> {
        self.header.get(idx).map(String::as_str)
    }

    fn axis(&self, first: usize, name: &str) -> Result<Axis, Error> {
        let nbins = parse::<usize>(&format!("N{name}"), self.header_entry(first))?;
        let min = parse_f64(&format!("{name}MIN"), self.header_entry(first + 1))?;
        let max = parse_f64(&format!("{name}MAX"), self.header_entry(first + 2))?;
        Axis::new(nbins, min, max)
    }

    fn contents(&self, n: usize) -> Result<Vec<f64>, Error> {
        if self.values.len() > n {
            return Err(ParseError::TrailingEntries(self.values[n].clone()).into());
        }
        let mut contents = Vec::with_capacity(n);
        for i in 0..n {
            let name = format!("bin content {}", i + 1);
            contents.push(parse_f64(&name, self.values.get(i).map(String::as_str))?);
        }
        Ok(contents)
    }
}

/// Read a one-dimensional histogram
///
/// ```text
/// hist1d NBINS XMIN XMAX
/// c1 c2 ... cN
/// ```
pub fn read_hist1d<T: BufRead>(stream: T) -> Result<Hist1D, Error> {
    let table = read_table(stream, "hist1d")?;
    let axis = table.axis(1, "X")?;
    let contents = table.contents(axis.nbins())?;
    Hist1D::from_contents(axis.min(), axis.max(), &contents)
}

/// Read a two-dimensional histogram with the x bin index running fastest
///
/// ```text
/// hist2d NX XMIN XMAX NY YMIN YMAX
/// c(1,1) c(2,1) ... c(NX,NY)
/// ```
pub fn read_hist2d<T: BufRead>(stream: T) -> Result<Hist2D, Error> {
    let table = read_table(stream, "hist2d")?;
    let x = table.axis(1, "X")?;
    let y = table.axis(4, "Y")?;
    let contents = table.contents(x.nbins() * y.nbins())?;
    Hist2D::from_contents(x, y, &contents)
}

/// Read a curve given as `x y` pairs after a `graph` header
pub fn read_graph<T: BufRead>(stream: T) -> Result<Graph, Error> {
    let table = read_table(stream, "graph")?;
    if table.values.len() % 2 != 0 {
        return Err(ParseError::MissingEntry(format!(
            "y value for x = {}",
            table.values[table.values.len() - 1]
        ))
        .into());
    }
    let mut points = Vec::with_capacity(table.values.len() / 2);
    for (n, pair) in table.values.chunks(2).enumerate() {
        let x = parse_f64(&format!("x({})", n + 1), Some(&pair[0]))?;
        let y = parse_f64(&format!("y({})", n + 1), Some(&pair[1]))?;
        points.push((x, y));
    }
    Graph::new(points)
}

/// Read the beam conditions: a title line followed by
/// `pileup sigmaXY sigmaZ`
pub fn read_beam<T: BufRead>(mut stream: T) -> Result<BeamConditions, Error> {
    let mut title = String::new();
    if stream.read_line(&mut title)? == 0 {
        return Err(ParseError::EndOfFile("beam data title").into());
    }
    let lines = content_lines(stream)?;
    let mut entries = lines.iter().flat_map(|line| line.split_whitespace());
    let beam = BeamConditions {
        pileup: parse_f64("pileup", entries.next())?,
        sigma_xy: parse_f64("sigmaXY", entries.next())?,
        sigma_z: parse_f64("sigmaZ", entries.next())?,
    };
    tracing::info!(
        "Beam conditions: mean pileup {}, sigma_xy {} mm, sigma_z {} mm",
        beam.pileup,
        beam.sigma_xy,
        beam.sigma_z
    );
    Ok(beam)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;

    fn open(name: &str) -> io::BufReader<fs::File> {
        let file = fs::File::open(format!("test_data/{name}")).expect("file not found");
        io::BufReader::new(file)
    }

    #[test]
    fn species_table() {
        let table = read_species(open("particles.dat")).unwrap();
        let kst = table.get("K*0").unwrap();
        assert_eq!(kst.id, 313);
        assert_eq!(kst.lineshape, Some(LineshapeKind::RelativisticBreitWigner));
        assert_eq!(kst.width, 0.0473);
        let anti = table.get("K*0b").unwrap();
        assert_eq!(anti.id, -313);
        let pim = table.get("pi-").unwrap();
        assert_eq!(pim.id, -211);
        assert_eq!(pim.charge, -1.);
        let gamma = table.by_id(22).unwrap();
        assert_eq!(gamma.name, "gamma");
        assert!(table.by_id(-22).is_none());
        assert_eq!(table.get("rho0").unwrap().lineshape, Some(LineshapeKind::GounarisSakurai));
        assert_eq!(table.get("B0").unwrap().ctau, 0.4557);
    }

    #[test]
    fn bad_species_rows() {
        let text = "ID name anti mass width charge spin shape ctau\n\
                    511 B0 B0b 5.27966 0. 0 0 XYZ 0.4557\n";
        let err = read_species(io::Cursor::new(text)).unwrap_err();
        assert!(err.to_string().contains("XYZ"));

        let text = "title\n511 B0 B0b 5.27966 0. 0 0\n";
        assert!(read_species(io::Cursor::new(text)).is_err());

        let text = "title\n511 B0 B0b 5.2x 0. 0 0 --- 0.4557\n";
        let err = read_species(io::Cursor::new(text)).unwrap_err();
        assert!(err.to_string().contains("5.2x"));
    }

    #[test]
    fn histograms() {
        let pt = read_hist1d(open("parent_pt.hist")).unwrap();
        assert_eq!(pt.nbins(), 20);
        assert_eq!(pt.axis().max(), 20.);
        assert!(pt.bin_content(1) < pt.bin_content(3));
        assert!(pt.bin_content(20) < pt.bin_content(3));

        let text = "# pt vs eta\nhist2d 2 0 10 3 2 5\n1 2\n3 4 # comment\n5 6\n";
        let hist = read_hist2d(io::Cursor::new(text)).unwrap();
        assert_eq!(hist.bin_content(2, 1), 2.);
        assert_eq!(hist.bin_content(1, 2), 3.);
        assert_eq!(hist.bin_content(2, 3), 6.);
        assert_eq!(hist.integral(), 21.);

        let text = "hist1d 3 0 1\n1 2\n";
        assert!(read_hist1d(io::Cursor::new(text)).is_err());
        let text = "hist1d 1 0 1\n1 2\n";
        assert!(read_hist1d(io::Cursor::new(text)).is_err());
        let text = "hist2d 1 0 1 1 0 1\n1\n";
        assert!(read_hist1d(io::Cursor::new(text)).is_err());
    }

    #[test]
    fn graph() {
        let graph = read_graph(open("momentum_resolution.graph")).unwrap();
        assert_eq!(graph.points().len(), 6);
        assert_eq!(graph.eval(0.), graph.points()[0].1);
        assert!(read_graph(io::Cursor::new("graph\n1 2\n3\n")).is_err());
    }

    #[test]
    fn beam() {
        let beam = read_beam(open("beam.dat")).unwrap();
        assert_eq!(beam.pileup, 1.1);
        assert_eq!(beam.sigma_xy, 0.032);
        assert_eq!(beam.sigma_z, 46.7);
        assert!(read_beam(io::Cursor::new("title\n1.1 0.032\n")).is_err());
    }
}
