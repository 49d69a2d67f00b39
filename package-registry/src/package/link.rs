//! Cross-linking of dataset streams into config template inputs.

use super::{ConfigTemplate, Dataset, Input, Stream};

/// Return copies of `templates` where every input carries the streams of all
/// datasets whose stream `input` equals the input's `type`.
///
/// Linked streams are annotated with the owning dataset's id. Streams that
/// reference an input no template declares are left unlinked.
pub fn link_streams(templates: &[ConfigTemplate], datasets: &[Dataset]) -> Vec<ConfigTemplate> {
    templates
        .iter()
        .map(|template| ConfigTemplate {
            inputs: template
                .inputs
                .iter()
                .map(|input| link_input(input, datasets))
                .collect(),
            ..template.clone()
        })
        .collect()
}

fn link_input(input: &Input, datasets: &[Dataset]) -> Input {
    let mut streams = input.streams.clone();
    for dataset in datasets {
        streams.extend(
            dataset
                .streams
                .iter()
                .filter(|stream| stream.input == input.input_type)
                .map(|stream| Stream {
                    dataset: Some(dataset.id.clone()),
                    ..stream.clone()
                }),
        );
    }

    Input {
        streams,
        ..input.clone()
    }
}
