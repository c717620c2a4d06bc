use chrono::NaiveDateTime;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};

use super::format::{format_datetime, format_user};
use super::record::{ClinicalRecord, EncounterNode, ObservationNode, OrderNode, Reference};
use crate::error::SerializeError;

/// Writes clinical records as XML.
///
/// Scalars become attributes; location, encounter type, form and provider
/// become child elements with an id attribute and the display name as text.
/// Elements are always written as start/end pairs.
pub struct RecordWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl RecordWriter {
    /// Starts a document; `indent` spaces per level, or compact when `None`.
    pub fn new(indent: Option<usize>) -> Result<Self, SerializeError> {
        let cursor = Cursor::new(Vec::new());
        let mut writer = match indent {
            Some(size) => Writer::new_with_indent(cursor, b' ', size),
            None => Writer::new(cursor),
        };

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        Ok(Self { writer })
    }

    pub fn open(&mut self, name: &str) -> Result<(), SerializeError> {
        start(&mut self.writer, name, &Attributes::default())?;
        Ok(())
    }

    pub fn close(&mut self, name: &str) -> Result<(), SerializeError> {
        end(&mut self.writer, name)?;
        Ok(())
    }

    pub fn write_record(&mut self, record: &ClinicalRecord) -> Result<(), SerializeError> {
        write_patient_data(&mut self.writer, record)?;
        Ok(())
    }

    pub fn finish(self) -> Result<String, SerializeError> {
        Ok(String::from_utf8(self.writer.into_inner().into_inner())?)
    }
}

/// One record as a complete `<patient_data>` document.
pub fn record_to_xml(record: &ClinicalRecord, indent: Option<usize>) -> Result<String, SerializeError> {
    let mut writer = RecordWriter::new(indent)?;
    writer.write_record(record)?;
    writer.finish()
}

#[derive(Default)]
struct Attributes(Vec<(&'static str, String)>);

impl Attributes {
    fn set(&mut self, name: &'static str, value: impl ToString) {
        self.0.push((name, value.to_string()));
    }

    fn set_opt<T: ToString>(&mut self, name: &'static str, value: Option<T>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    fn set_datetime(&mut self, name: &'static str, value: Option<NaiveDateTime>) {
        self.set_opt(name, value.as_ref().map(format_datetime));
    }
}

fn start<W: Write>(writer: &mut Writer<W>, name: &str, attributes: &Attributes) -> quick_xml::Result<()> {
    let mut elem = BytesStart::new(name);
    for (key, value) in &attributes.0 {
        elem.push_attribute((*key, value.as_str()));
    }
    writer.write_event(Event::Start(elem))
}

fn end<W: Write>(writer: &mut Writer<W>, name: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))
}

fn text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &Attributes,
    text: &str,
) -> quick_xml::Result<()> {
    start(writer, name, attributes)?;
    if !text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    end(writer, name)
}

fn write_patient_data<W: Write>(writer: &mut Writer<W>, record: &ClinicalRecord) -> quick_xml::Result<()> {
    let patient = &record.patient;
    let mut attributes = Attributes::default();
    attributes.set("patient_id", patient.patient_id);
    attributes.set_opt("gender", patient.gender.as_ref());
    attributes.set_opt("race", patient.race.as_ref());
    attributes.set_datetime("birthdate", patient.birthdate);
    attributes.set_opt("birthdate_estimated", patient.birthdate_estimated);
    attributes.set_opt("birthplace", patient.birthplace.as_ref());
    attributes.set_opt("citizenship", patient.citizenship.as_ref());
    attributes.set_opt("tribe", patient.tribe.as_ref());
    attributes.set_opt("mothers_name", patient.mothers_name.as_ref());
    attributes.set_opt("civil_status", patient.civil_status.as_ref());
    attributes.set_datetime("death_date", patient.death_date);
    attributes.set_opt("cause_of_death", patient.cause_of_death.as_ref());
    attributes.set_opt("health_district", patient.health_district.as_ref());
    if let Some(center) = &patient.health_center {
        attributes.set("health_center", &center.name);
        attributes.set("health_center_id", center.id);
    }

    start(writer, "patient_data", &Attributes::default())?;
    start(writer, "patient", &attributes)?;

    for encounter in &record.encounters {
        write_encounter(writer, encounter)?;
    }
    write_observations(writer, &record.unattached_observations)?;

    end(writer, "patient")?;
    end(writer, "patient_data")
}

fn write_encounter<W: Write>(writer: &mut Writer<W>, encounter: &EncounterNode) -> quick_xml::Result<()> {
    let mut attributes = Attributes::default();
    attributes.set_datetime("datetime", encounter.datetime);
    start(writer, "encounter", &attributes)?;

    let metadata = &encounter.metadata;
    start(writer, "metadata", &Attributes::default())?;
    write_reference(writer, "location", "location_id", metadata.location.as_ref())?;
    write_reference(
        writer,
        "encounter_type",
        "encounter_type_id",
        metadata.encounter_type.as_ref(),
    )?;
    write_reference(writer, "form", "form_id", metadata.form.as_ref())?;
    write_reference(writer, "provider", "provider_id", metadata.provider.as_ref())?;
    end(writer, "metadata")?;

    write_observations(writer, &encounter.observations)?;

    if !encounter.orders.is_empty() {
        start(writer, "orders", &Attributes::default())?;
        for order in &encounter.orders {
            write_order(writer, order)?;
        }
        end(writer, "orders")?;
    }

    end(writer, "encounter")
}

fn write_reference<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    id_attribute: &'static str,
    reference: Option<&Reference>,
) -> quick_xml::Result<()> {
    let Some(reference) = reference else {
        return Ok(());
    };
    let mut attributes = Attributes::default();
    attributes.set(id_attribute, reference.id);
    text_element(writer, name, &attributes, &reference.name)
}

/// Nothing is written for an empty list.
fn write_observations<W: Write>(writer: &mut Writer<W>, observations: &[ObservationNode]) -> quick_xml::Result<()> {
    if observations.is_empty() {
        return Ok(());
    }
    start(writer, "observations", &Attributes::default())?;
    for obs in observations {
        write_obs(writer, obs)?;
    }
    end(writer, "observations")
}

fn write_obs<W: Write>(writer: &mut Writer<W>, obs: &ObservationNode) -> quick_xml::Result<()> {
    let mut attributes = Attributes::default();
    attributes.set("obs_id", obs.obs_id);
    attributes.set("concept_id", obs.concept_id);
    attributes.set("concept_name", &obs.concept_name);
    attributes.set_opt("data_type", obs.data_type());
    attributes.set_datetime("datetime", obs.datetime);
    attributes.set_opt("accession_number", obs.accession_number.as_ref());
    attributes.set_opt("comment", obs.comment.as_ref());
    attributes.set_datetime("date_started", obs.date_started);
    attributes.set_datetime("date_stopped", obs.date_stopped);
    attributes.set_opt("obs_group_id", obs.obs_group_id);
    attributes.set_opt("value_group_id", obs.value_group_id);
    if let Some(value) = &obs.value {
        for (name, rendered) in value.attributes() {
            attributes.set(name, rendered);
        }
    }
    attributes.set_opt("value_modifier", obs.value_modifier.as_ref());

    let body = obs.rendered_value().unwrap_or_default();
    text_element(writer, "obs", &attributes, &body)
}

fn write_order<W: Write>(writer: &mut Writer<W>, order: &OrderNode) -> quick_xml::Result<()> {
    let mut attributes = Attributes::default();
    attributes.set("order_id", order.order_id);
    attributes.set("order_type", &order.order_type);
    attributes.set("concept_id", order.concept_id);
    attributes.set("concept_name", &order.concept_name);
    attributes.set_opt("instructions", order.instructions.as_ref());
    attributes.set_datetime("start_date", order.start_date);
    attributes.set_datetime("auto_expire_date", order.auto_expire_date);
    attributes.set_opt("orderer", order.orderer.as_ref().map(format_user));
    attributes.set_opt("discontinued", order.discontinued);
    attributes.set_datetime("discontinued_date", order.discontinued_date);
    attributes.set_opt("discontinued_reason", order.discontinued_reason.as_ref());

    start(writer, "order", &attributes)?;
    end(writer, "order")
}
