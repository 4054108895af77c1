//! CSV fix log source integration

use std::io::Read;

use csv::{Reader, StringRecord};
use geo::geometry::Point;
use time::format_description::well_known;
use time::OffsetDateTime;

use super::{FieldsConfiguration, FixSource, RecordedFix};
use crate::model::Fix;

/// Fixes recorded in a CSV file, one per row
pub struct CsvFixSource<T>
where
    T: Read,
{
    rdr: Reader<T>,
    fields: FieldsConfiguration,
}

impl<T> CsvFixSource<T>
where
    T: Read,
{
    pub fn new(rdr: Reader<T>, fields: Option<FieldsConfiguration>) -> Self {
        Self {
            rdr,
            fields: fields.unwrap_or_default(),
        }
    }
}

impl<T> FixSource for CsvFixSource<T>
where
    T: Read,
{
    fn fetch(
        &mut self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<RecordedFix>, String> {
        let mut fixes = vec![];

        let mut header = self
            .rdr
            .headers()
            .map_err(|e| format!("Failed on read the header: {}", e))?
            .clone();
        let header_idx = parse_header(&self.fields, &mut header)?;

        for row in self.rdr.records() {
            let mut rec = row.map_err(|e| format!("Failed on read some row: {}", e))?;

            if rec.len() < 3 {
                continue;
            }

            let recorded = parse_row(&header_idx, &mut rec)
                .map_err(|e| format!("Error with row {:?}: {}", rec, e))?;

            if let Some(recorded) = recorded {
                if start <= recorded.fix.time && recorded.fix.time <= end {
                    fixes.push(recorded);
                }
            }
        }
        fixes.sort_by_key(|r| r.fix.time);

        Ok(fixes)
    }
}

/// Field to index map
#[derive(Debug)]
struct FieldsIndex {
    time: usize,
    latitude: usize,
    longitude: usize,
    altitude: Option<usize>,
    course: Option<usize>,
    speed: Option<usize>,
    horizontal_accuracy: Option<usize>,
    vertical_accuracy: Option<usize>,
    observing: Option<usize>,
}

fn parse_header(
    fields: &FieldsConfiguration,
    header: &mut StringRecord,
) -> Result<FieldsIndex, String> {
    header.trim();

    let position = |name: &str| {
        header
            .iter()
            .position(|h| h.to_lowercase() == name.to_lowercase())
    };

    Ok(FieldsIndex {
        time: position(&fields.time).ok_or("Time header not found")?,
        latitude: position(&fields.latitude).ok_or("Latitude header not found")?,
        longitude: position(&fields.longitude).ok_or("Longitude header not found")?,
        altitude: position(&fields.altitude),
        course: position(&fields.course),
        speed: position(&fields.speed),
        horizontal_accuracy: position(&fields.horizontal_accuracy),
        vertical_accuracy: position(&fields.vertical_accuracy),
        observing: position(&fields.observing),
    })
}

fn parse_row(header: &FieldsIndex, row: &mut StringRecord) -> Result<Option<RecordedFix>, String> {
    row.trim();

    let lat = row.get(header.latitude).unwrap_or_default();
    let lng = row.get(header.longitude).unwrap_or_default();
    if lat.is_empty() || lng.is_empty() {
        return Ok(None);
    }
    let lat = lat
        .parse::<f64>()
        .map_err(|e| format!("Invalid latitude format: {}", e))?;
    let lng = lng
        .parse::<f64>()
        .map_err(|e| format!("Invalid longitude format: {}", e))?;

    let time = match row.get(header.time) {
        Some(d) => OffsetDateTime::parse(d, &well_known::Rfc3339)
            .map_err(|e| format!("Failed on parse the time: {}", e)),
        None => Err("Time field not found".to_string()),
    }?;

    let number = |idx: Option<usize>| idx.and_then(|i| row.get(i)).and_then(|d| d.parse::<f64>().ok());

    let mut fix = Fix::basic(Point::new(lng, lat), time);
    fix.altitude = number(header.altitude);
    fix.course = number(header.course);
    fix.speed = number(header.speed);
    fix.horizontal_accuracy = number(header.horizontal_accuracy);
    fix.vertical_accuracy = number(header.vertical_accuracy);

    let observing = match header.observing.and_then(|i| row.get(i)) {
        Some(d) => parse_flag(d)?,
        None => None,
    };

    Ok(Some(RecordedFix { fix, observing }))
}

fn parse_flag(value: &str) -> Result<Option<bool>, String> {
    match value.to_lowercase().as_str() {
        "" => Ok(None),
        "true" | "yes" | "1" => Ok(Some(true)),
        "false" | "no" | "0" => Ok(Some(false)),
        other => Err(format!("Invalid observing flag `{}`", other)),
    }
}

#[cfg(test)]
pub mod tests {
    use csv::ReaderBuilder;
    use geo::geometry::Point;
    use time::macros::datetime;

    use super::CsvFixSource;
    use crate::sources::{FieldsConfiguration, FixSource};

    #[test]
    fn fixes() -> Result<(), String> {
        let data = "\n
            time,latitude,longitude\n
            2019-10-01T00:03:00.000+00:00,-26.31832,-48.8902222\n
            2019-10-01T00:01:00.000+00:00,-26.31832,-48.8702222\n
            2019-10-01T00:02:00.000+00:00,-26.31832,-48.8802222\n
        ";
        let rdr = ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes());

        let mut source = CsvFixSource::new(rdr, None);
        let fixes = source.fetch(
            datetime!(2010-05-24 0:00 UTC),
            datetime!(2023-05-24 0:00 UTC),
        )?;

        assert_eq!(3, fixes.len());
        assert_eq!(Point::new(-48.8702222, -26.31832), fixes[0].fix.coordinates);
        assert_eq!(datetime!(2019-10-01 0:01 UTC), fixes[0].fix.time);
        assert_eq!(datetime!(2019-10-01 0:03 UTC), fixes[2].fix.time);
        assert_eq!(None, fixes[0].fix.horizontal_accuracy);
        assert_eq!(None, fixes[0].observing);

        Ok(())
    }

    #[test]
    fn fixes_filter() -> Result<(), String> {
        let data = "\n
            time,latitude,longitude\n
            2019-10-01T00:01:00.000+00:00,-26.31832,-48.8702222\n
            2019-10-02T00:02:00.000+00:00,-26.31832,-48.8802222\n
            2019-10-03T00:03:00.000+00:00,,-48.8902222\n
            2019-10-01T00:04:00.000+00:00,-26.31832, \n
        ";
        let rdr = ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes());

        let mut source = CsvFixSource::new(rdr, None);
        let fixes = source.fetch(
            datetime!(2019-10-01 0:00 UTC),
            datetime!(2019-10-01 2:00 UTC),
        )?;
        assert_eq!(1, fixes.len());

        Ok(())
    }

    #[test]
    fn extra_fields() -> Result<(), String> {
        let data = "\n
            Time,Lat,Lon,altitude,course,speed,horizontal_accuracy,observing\n
            2019-10-01T00:01:00.000+00:00,61.2,-149.9,200,90.5,0.2,5,yes\n
            2019-10-01T00:01:10.000+00:00,61.2,-149.9,198.0,,0.7,-1,0\n
        ";
        let rdr = ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes());

        let fields = FieldsConfiguration {
            latitude: "lat".to_string(),
            longitude: "lon".to_string(),
            ..FieldsConfiguration::default()
        };
        let mut source = CsvFixSource::new(rdr, Some(fields));
        let fixes = source.fetch(
            datetime!(2010-10-01 0:00 UTC),
            datetime!(2020-10-01 2:00 UTC),
        )?;
        assert_eq!(2, fixes.len());

        let first = &fixes[0];
        assert_eq!(Some(200.0), first.fix.altitude);
        assert_eq!(Some(90.5), first.fix.course);
        assert_eq!(Some(0.2), first.fix.speed);
        assert_eq!(Some(5.0), first.fix.horizontal_accuracy);
        assert_eq!(None, first.fix.vertical_accuracy);
        assert_eq!(Some(true), first.observing);

        let second = &fixes[1];
        assert_eq!(None, second.fix.course);
        assert_eq!(Some(-1.0), second.fix.horizontal_accuracy);
        assert_eq!(Some(false), second.observing);

        Ok(())
    }

    #[test]
    fn missing_header() {
        let data = "time,latitude\n2019-10-01T00:01:00.000+00:00,61.2\n";
        let rdr = ReaderBuilder::new().from_reader(data.as_bytes());

        let mut source = CsvFixSource::new(rdr, None);
        let result = source.fetch(
            datetime!(2010-10-01 0:00 UTC),
            datetime!(2020-10-01 2:00 UTC),
        );
        assert_eq!(Err("Longitude header not found".to_string()), result);
    }
}
