use crate::config::JobConfig;
use crate::core::{Bindable, FieldSetter, ParameterSource, Result, RowReader, Sink, TextFields};
use crate::job::Job;
use crate::listener::{CompletionNotificationListener, LoggingListener};
use crate::mapper::FieldMapper;
use crate::source::{DelimitedSource, Resource};
use crate::step::ChunkStep;
use crate::transform::UppercaseTransform;
use crate::writer::ChunkedWriter;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
}

impl Person {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "firstName: {}, lastName: {}", self.first_name, self.last_name)
    }
}

impl Bindable for Person {
    fn setter(name: &str) -> Option<FieldSetter<Self>> {
        match name {
            "firstName" | "first_name" => Some(|p: &mut Person, v: String| p.first_name = v),
            "lastName" | "last_name" => Some(|p: &mut Person, v: String| p.last_name = v),
            _ => None,
        }
    }
}

impl TextFields for Person {
    fn text_fields_mut(&mut self) -> Vec<&mut String> {
        vec![&mut self.first_name, &mut self.last_name]
    }
}

impl ParameterSource for Person {
    fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "firstName" | "first_name" => Some(self.first_name.clone()),
            "lastName" | "last_name" => Some(self.last_name.clone()),
            _ => None,
        }
    }
}

/// Wires the person import: delimited file, uppercase transform, batched
/// insert into the configured table, then a read-back of that table.
pub fn import_people_job(
    config: &JobConfig,
    sink: Box<dyn Sink>,
    reader: Box<dyn RowReader>,
) -> Result<Job> {
    config.validate()?;
    let spec = config.binding_spec()?;

    let source = DelimitedSource::new(Resource::file(&config.input), &spec)
        .with_delimiter(config.delimiter_byte())
        .with_lines_to_skip(config.lines_to_skip)
        .with_comment_prefixes(config.comment_prefixes.clone())
        .with_skip_blank_lines(config.skip_blank_lines);
    let mapper = FieldMapper::<Person>::new(&spec)?;
    let writer = ChunkedWriter::<Person>::new(&config.insert_sql, sink)?;
    let table = writer.statement().table.clone();
    let columns = writer.statement().columns.clone();

    let step = ChunkStep::new(
        config.step_name.clone(),
        config.chunk_size,
        Box::new(source),
        mapper,
        Box::new(UppercaseTransform::<Person>::new()),
        writer,
    )?
    .with_malformed_policy(config.malformed_policy);

    Job::builder(config.job_name.clone())
        .step(step)
        .listener(LoggingListener)
        .listener(CompletionNotificationListener)
        .read_back(reader, table, columns)
        .build()
}
