/// MTD XML parser
///
/// Turns the XML exports of the metadata service into framework and dataset
/// records. Element lookups are lenient: a missing element or an element
/// with blank text yields the field default, never an error.
use crate::{
    config::MetadataServiceConfig,
    error::SyncResult,
    xml::records::{ActorRecord, DatasetRecord, FrameworkRecord},
};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use roxmltree::{Document, Node, ParsingOptions};
use uuid::Uuid;

/// Column length of framework and dataset names
pub const NAME_MAX_LENGTH: usize = 255;

/// Dataset names at least this long are shortened
const DATASET_NAME_TRUNCATE_AT: usize = 256;

/// Characters kept from a shortened dataset name, before the ellipsis
const DATASET_NAME_KEPT_CHARS: usize = 252;

const TRUNCATED_NAME_PREFIX: &str = "Full dataset name in MTD: ";

const ATTR_DIGITIZER: &str = "ID_CREATEUR";
const ATTR_INSTANCE: &str = "ID_INSTANCE";
const ATTR_DATA_ORIGIN: &str = "CODE_STATUT_DONNEES_SOURCE";

const FRAMEWORK_CONTACT_TAGS: &[&str] = &["acteurPrincipal", "acteurAutre"];
const DATASET_CONTACT_TAGS: &[&str] = &["pointContactPF", "pointContactJdd"];

/// Values of the `attributsAdditionnels` block we care about
#[derive(Debug, Default)]
struct AdditionalAttributes {
    id_digitizer: Option<i64>,
    id_instance: Option<String>,
    data_origin_code: Option<String>,
}

/// Parser bound to one element namespace and an optional instance filter
#[derive(Debug, Clone)]
pub struct MtdXmlParser {
    namespace: String,
    id_instance_filter: Option<u32>,
}

impl MtdXmlParser {
    /// Create a parser. `namespace` is the bare namespace URI.
    pub fn new(namespace: impl Into<String>, id_instance_filter: Option<u32>) -> Self {
        Self {
            namespace: namespace.into(),
            id_instance_filter,
        }
    }

    pub fn from_config(config: &MetadataServiceConfig) -> Self {
        Self::new(config.xml_namespace.clone(), config.id_instance_filter)
    }

    /// Parse every acquisition framework of a document
    pub fn parse_frameworks(&self, xml: &[u8]) -> SyncResult<Vec<FrameworkRecord>> {
        let text = String::from_utf8_lossy(xml);
        let doc = parse_document(&text)?;

        let frameworks = doc
            .root_element()
            .descendants()
            .filter(|n| self.is_element(n, "CadreAcquisition"))
            .map(|n| self.framework_from_node(n))
            .filter(|af| self.matches_instance(af.id_instance.as_deref()))
            .collect();

        Ok(frameworks)
    }

    /// Parse the first acquisition framework of a document, without
    /// instance filtering
    pub fn parse_single_framework(&self, xml: &[u8]) -> SyncResult<Option<FrameworkRecord>> {
        let text = String::from_utf8_lossy(xml);
        let doc = parse_document(&text)?;

        Ok(doc
            .root_element()
            .descendants()
            .find(|n| self.is_element(n, "CadreAcquisition"))
            .map(|n| self.framework_from_node(n)))
    }

    /// Parse every dataset of a document
    pub fn parse_datasets(&self, xml: &[u8]) -> SyncResult<Vec<DatasetRecord>> {
        let text = String::from_utf8_lossy(xml);
        let doc = parse_document(&text)?;

        let datasets = doc
            .root_element()
            .descendants()
            .filter(|n| self.is_element(n, "JeuDeDonnees"))
            .map(|n| self.dataset_from_node(n))
            .filter(|ds| self.matches_instance(ds.id_instance.as_deref()))
            .collect();

        Ok(datasets)
    }

    fn framework_from_node(&self, node: Node) -> FrameworkRecord {
        let attributes = self.additional_attributes(node);
        if attributes.id_instance.is_none() {
            tracing::warn!("Framework without {} attribute", ATTR_INSTANCE);
        }

        let uuid = self
            .tag_text(node, "identifiantCadre")
            .and_then(|raw| parse_uuid(&raw));

        let name = truncate_chars(
            &self.tag_text(node, "libelle").unwrap_or_default(),
            NAME_MAX_LENGTH - 1,
        );

        let temporal = self.child(node, "ReferenceTemporelle");
        let start_date = temporal
            .and_then(|t| self.tag_date(t, "dateLancement"))
            .unwrap_or_else(now);
        let end_date = temporal.and_then(|t| self.tag_date(t, "dateCloture"));

        let actors = FRAMEWORK_CONTACT_TAGS
            .iter()
            .flat_map(|tag| self.contact_actors(node, tag))
            .collect();

        FrameworkRecord {
            uuid,
            name,
            description: self.tag_text(node, "description").unwrap_or_default(),
            start_date,
            end_date,
            create_date: self.tag_date(node, "dateCreationMtd").unwrap_or_else(now),
            update_date: self.tag_date(node, "dateMiseAJourMtd"),
            id_digitizer: attributes.id_digitizer,
            id_instance: attributes.id_instance,
            actors,
        }
    }

    fn dataset_from_node(&self, node: Node) -> DatasetRecord {
        let attributes = self.additional_attributes(node);

        let uuid = self
            .tag_text(node, "identifiantJdd")
            .and_then(|raw| parse_uuid(&raw));
        let framework_uuid = self
            .tag_text(node, "identifiantCadre")
            .and_then(|raw| parse_uuid(unwrap_url_identifier(&raw)));

        let full_name = self.tag_text(node, "libelle").unwrap_or_default();
        let mut description = self.tag_text(node, "description");
        let name = if full_name.chars().count() >= DATASET_NAME_TRUNCATE_AT {
            description = Some(format!(
                "{}{}\n {}",
                TRUNCATED_NAME_PREFIX,
                full_name,
                description.unwrap_or_default()
            ));
            format!("{}...", truncate_chars(&full_name, DATASET_NAME_KEPT_CHARS))
        } else {
            full_name
        };

        let mut actors: Vec<ActorRecord> = DATASET_CONTACT_TAGS
            .iter()
            .flat_map(|tag| self.contact_actors(node, tag))
            .collect();
        if let Some(production) = self.child(node, "BaseProduction") {
            actors.extend(self.contact_actors(production, "contactBaseProduction"));
        }

        DatasetRecord {
            uuid,
            framework_uuid,
            name,
            shortname: self.tag_text(node, "libelleCourt"),
            description,
            terrestrial_domain: parse_loose_bool(self.tag_text(node, "domaineTerrestre").as_deref()),
            marine_domain: parse_loose_bool(self.tag_text(node, "domaineMarin").as_deref()),
            data_type_code: self.tag_text(node, "typeDonnees"),
            data_origin_code: attributes.data_origin_code,
            id_digitizer: attributes.id_digitizer,
            create_date: self.tag_date(node, "dateCreation").unwrap_or_else(now),
            update_date: self.tag_date(node, "dateRevision"),
            id_instance: attributes.id_instance,
            actors,
        }
    }

    /// Actors listed under every `tag` child of `node`
    fn contact_actors(&self, node: Node, tag: &str) -> Vec<ActorRecord> {
        self.children(node, tag)
            .flat_map(|contact| contact.children().filter(|n| n.is_element()))
            .map(|actor| ActorRecord {
                name: self.tag_text(actor, "nomPrenom"),
                role_code: self.tag_text(actor, "roleActeur"),
                uuid_organism: self
                    .tag_text(actor, "idOrganisme")
                    .as_deref()
                    .and_then(parse_uuid),
                organism: self.tag_text(actor, "organisme"),
                email: self.tag_text(actor, "mail"),
            })
            .collect()
    }

    fn additional_attributes(&self, node: Node) -> AdditionalAttributes {
        let mut attributes = AdditionalAttributes::default();
        let Some(block) = self.child(node, "attributsAdditionnels") else {
            return attributes;
        };

        for attribute in block.children().filter(|n| n.is_element()) {
            let (Some(key), Some(value)) = (
                self.tag_text(attribute, "nomAttribut"),
                self.tag_text(attribute, "valeurAttribut"),
            ) else {
                continue;
            };

            match key.as_str() {
                ATTR_DIGITIZER => attributes.id_digitizer = value.parse().ok(),
                ATTR_INSTANCE => attributes.id_instance = Some(value),
                ATTR_DATA_ORIGIN => attributes.data_origin_code = Some(value),
                _ => {}
            }
        }

        attributes
    }

    fn matches_instance(&self, id_instance: Option<&str>) -> bool {
        match self.id_instance_filter {
            None => true,
            Some(filter) => id_instance.and_then(|v| v.parse::<u32>().ok()) == Some(filter),
        }
    }

    fn is_element(&self, node: &Node, tag: &str) -> bool {
        node.is_element()
            && node.tag_name().name() == tag
            && node.tag_name().namespace() == Some(self.namespace.as_str())
    }

    fn child<'a, 'input>(&self, node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
        node.children().find(|n| self.is_element(n, tag))
    }

    fn children<'a, 'input: 'a>(
        &'a self,
        node: Node<'a, 'input>,
        tag: &'a str,
    ) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
        node.children().filter(move |n| self.is_element(n, tag))
    }

    /// Trimmed text of a direct child, `None` when missing or blank
    fn tag_text(&self, node: Node, tag: &str) -> Option<String> {
        self.child(node, tag)
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }

    fn tag_date(&self, node: Node, tag: &str) -> Option<NaiveDateTime> {
        let raw = self.tag_text(node, tag)?;
        let parsed = parse_datetime(&raw);
        if parsed.is_none() {
            tracing::warn!("Ignoring unparseable date in <{}>: {}", tag, raw);
        }
        parsed
    }
}

fn parse_document(text: &str) -> SyncResult<Document<'_>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn parse_uuid(raw: &str) -> Option<Uuid> {
    match Uuid::parse_str(raw.trim()) {
        Ok(uuid) => Some(uuid),
        Err(e) => {
            tracing::warn!("Ignoring invalid UUID {:?}: {}", raw, e);
            None
        }
    }
}

/// `http://oafs.fr/meta/ca/<uuid>` style identifiers keep their last segment
pub fn unwrap_url_identifier(raw: &str) -> &str {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(raw)
    } else {
        raw
    }
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Truthy text as found in the exports; anything unknown is false
pub fn parse_loose_bool(raw: Option<&str>) -> bool {
    raw.map(|v| v.trim().to_ascii_lowercase())
        .map(|v| matches!(v.as_str(), "true" | "1" | "yes" | "oui" | "t" | "y"))
        .unwrap_or(false)
}

/// Accepts RFC 3339 timestamps, naive timestamps and plain dates
/// (an optional timezone suffix on a date is ignored)
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    raw.get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_XML_NAMESPACE;

    const AF_XML: &str = include_str!("../../tests/fixtures/af.xml");
    const DS_XML: &str = include_str!("../../tests/fixtures/jdd.xml");

    fn parser() -> MtdXmlParser {
        MtdXmlParser::new(DEFAULT_XML_NAMESPACE, None)
    }

    fn dataset_doc(body: &str) -> String {
        format!(
            r#"<jdd:JeuxDeDonnees xmlns:jdd="{}"><jdd:JeuDeDonnees>{}</jdd:JeuDeDonnees></jdd:JeuxDeDonnees>"#,
            DEFAULT_XML_NAMESPACE, body
        )
    }

    #[test]
    fn test_parse_frameworks() {
        let frameworks = parser().parse_frameworks(AF_XML.as_bytes()).unwrap();
        assert_eq!(frameworks.len(), 3);

        let af = &frameworks[0];
        assert_eq!(
            af.uuid,
            Some(Uuid::parse_str("57b7d0f2-4183-4b7b-8f08-6e105d476dc5").unwrap())
        );
        assert_eq!(af.name, "Inventaire des odonates du bassin de la Loire");
        assert_eq!(af.description, "Suivi pluriannuel des odonates");
        assert_eq!(af.id_digitizer, Some(1001));
        assert_eq!(af.id_instance.as_deref(), Some("14"));
        assert_eq!(af.start_date, parse_datetime("2019-04-01").unwrap());
        assert_eq!(af.end_date, parse_datetime("2022-12-31"));
        assert_eq!(af.create_date, parse_datetime("2019-03-12T10:15:00").unwrap());

        // Main contact first, then the others, in document order
        let names: Vec<_> = af.actors.iter().map(|a| a.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["DUPONT Marie", "MARTIN Paul", "BERNARD Luc"]);
        assert_eq!(af.actors[0].role_code.as_deref(), Some("1"));
        assert_eq!(
            af.actors[0].uuid_organism,
            Uuid::parse_str("11111111-2222-4333-8444-555555555555").ok()
        );
        assert_eq!(af.actors[1].uuid_organism, None);
        assert!(!af.actors[2].has_organism());

        // Blank description falls back to the default
        assert_eq!(frameworks[1].description, "");
        assert_eq!(frameworks[1].end_date, None);

        assert_eq!(frameworks[2].uuid, None);
    }

    #[test]
    fn test_instance_filter() {
        let parser = MtdXmlParser::new(DEFAULT_XML_NAMESPACE, Some(14));
        let frameworks = parser.parse_frameworks(AF_XML.as_bytes()).unwrap();
        assert_eq!(frameworks.len(), 2);
        assert!(frameworks
            .iter()
            .all(|af| af.id_instance.as_deref() == Some("14")));

        let parser = MtdXmlParser::new(DEFAULT_XML_NAMESPACE, Some(99));
        assert_eq!(parser.parse_frameworks(AF_XML.as_bytes()).unwrap().len(), 1);
        assert_eq!(parser.parse_datasets(DS_XML.as_bytes()).unwrap().len(), 0);
    }

    #[test]
    fn test_parse_single_framework_ignores_filter() {
        let parser = MtdXmlParser::new(DEFAULT_XML_NAMESPACE, Some(99));
        let af = parser
            .parse_single_framework(AF_XML.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(af.id_instance.as_deref(), Some("14"));

        let empty = format!(r#"<ca:CadresAcquisition xmlns:ca="{}"/>"#, DEFAULT_XML_NAMESPACE);
        assert!(parser.parse_single_framework(empty.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_parse_datasets() {
        let datasets = parser().parse_datasets(DS_XML.as_bytes()).unwrap();
        assert_eq!(datasets.len(), 3);

        let ds = &datasets[0];
        assert_eq!(
            ds.uuid,
            Some(Uuid::parse_str("2d1f9c1e-7a3b-4f5e-9c8d-1e2f3a4b5c6d").unwrap())
        );
        // URL-prefixed framework id is unwrapped
        assert_eq!(
            ds.framework_uuid,
            Some(Uuid::parse_str("57b7d0f2-4183-4b7b-8f08-6e105d476dc5").unwrap())
        );
        assert_eq!(ds.shortname.as_deref(), Some("ODO-2019"));
        assert!(ds.terrestrial_domain);
        assert!(!ds.marine_domain);
        assert_eq!(ds.data_type_code.as_deref(), Some("1"));
        assert_eq!(ds.data_origin_code.as_deref(), Some("Pu"));
        assert_eq!(ds.id_digitizer, Some(1001));
        assert_eq!(ds.update_date, parse_datetime("2020-02-10T14:00:00"));

        let roles: Vec<_> = ds.actors.iter().map(|a| a.role_code.as_deref().unwrap()).collect();
        assert_eq!(roles, vec!["7", "8"]);

        assert_eq!(datasets[1].data_origin_code.as_deref(), Some("XX"));
        assert!(!datasets[1].terrestrial_domain);
        assert_eq!(datasets[1].shortname, None);
    }

    #[test]
    fn test_framework_name_truncation() {
        let long_name = "a".repeat(300);
        let xml = format!(
            r#"<ca:CadresAcquisition xmlns:ca="{}"><ca:CadreAcquisition><ca:libelle>{}</ca:libelle></ca:CadreAcquisition></ca:CadresAcquisition>"#,
            DEFAULT_XML_NAMESPACE, long_name
        );
        let af = parser()
            .parse_single_framework(xml.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(af.name.chars().count(), NAME_MAX_LENGTH - 1);
    }

    #[test]
    fn test_dataset_name_truncation() {
        let long_name = "é".repeat(300);
        let xml = dataset_doc(&format!(
            "<jdd:libelle>{}</jdd:libelle><jdd:description>Résumé</jdd:description>",
            long_name
        ));
        let ds = &parser().parse_datasets(xml.as_bytes()).unwrap()[0];

        assert_eq!(ds.name.chars().count(), 255);
        assert!(ds.name.ends_with("..."));
        let description = ds.description.as_deref().unwrap();
        assert!(description.starts_with(TRUNCATED_NAME_PREFIX));
        assert!(description.contains(&long_name));
        assert!(description.ends_with("\n Résumé"));

        // Just below the threshold the name is kept as is
        let short_name = "b".repeat(255);
        let xml = dataset_doc(&format!("<jdd:libelle>{}</jdd:libelle>", short_name));
        let ds = &parser().parse_datasets(xml.as_bytes()).unwrap()[0];
        assert_eq!(ds.name, short_name);
        assert_eq!(ds.description, None);
    }

    #[test]
    fn test_blank_and_invalid_values_are_absent() {
        let xml = dataset_doc(
            "<jdd:identifiantJdd>not-a-uuid</jdd:identifiantJdd>\
             <jdd:libelleCourt>   </jdd:libelleCourt>\
             <jdd:dateRevision>someday</jdd:dateRevision>\
             <jdd:domaineMarin>oui</jdd:domaineMarin>",
        );
        let ds = &parser().parse_datasets(xml.as_bytes()).unwrap()[0];
        assert_eq!(ds.uuid, None);
        assert_eq!(ds.shortname, None);
        assert_eq!(ds.update_date, None);
        assert!(ds.marine_domain);
        assert!(ds.actors.is_empty());
    }

    #[test]
    fn test_organism_uuid_is_parsed() {
        let xml = dataset_doc(
            r#"<jdd:identifiantJdd>2d1f9c1e-7a3b-4f5e-9c8d-1e2f3a4b5c6d</jdd:identifiantJdd>
            <jdd:libelle>DS</jdd:libelle>
            <jdd:pointContactJdd>
              <jdd:ActeurType>
                <jdd:roleActeur>7</jdd:roleActeur>
                <jdd:organisme>CEN</jdd:organisme>
                <jdd:idOrganisme>AAAAAAAA-2222-4333-8444-555555555555</jdd:idOrganisme>
              </jdd:ActeurType>
              <jdd:ActeurType>
                <jdd:roleActeur>7</jdd:roleActeur>
                <jdd:organisme>LPO</jdd:organisme>
                <jdd:idOrganisme>not-a-uuid</jdd:idOrganisme>
              </jdd:ActeurType>
            </jdd:pointContactJdd>"#,
        );
        let datasets = parser().parse_datasets(xml.as_bytes()).unwrap();
        let actors = &datasets[0].actors;

        assert_eq!(
            actors[0].uuid_organism.map(|u| u.to_string()),
            Some("aaaaaaaa-2222-4333-8444-555555555555".to_string())
        );
        // An invalid identifier leaves only the organism name
        assert_eq!(actors[1].uuid_organism, None);
        assert_eq!(actors[1].organism.as_deref(), Some("LPO"));
    }

    #[test]
    fn test_other_namespace_is_ignored() {
        let parser = MtdXmlParser::new("http://example.org/other", None);
        assert!(parser.parse_frameworks(AF_XML.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_document() {
        let err = parser().parse_frameworks(b"<ca:CadresAcquisition").unwrap_err();
        assert!(matches!(err, crate::error::SyncError::Xml(_)));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(
            unwrap_url_identifier("http://oafs.fr/meta/ca/ABC/"),
            "ABC"
        );
        assert_eq!(unwrap_url_identifier("ABC"), "ABC");

        assert!(parse_loose_bool(Some(" True ")));
        assert!(!parse_loose_bool(Some("false")));
        assert!(!parse_loose_bool(None));

        assert!(parse_datetime("2020-05-01T12:00:00+02:00").is_some());
        assert!(parse_datetime("2020-05-01 12:00:00").is_some());
        assert_eq!(
            parse_datetime("2020-05-01+02:00"),
            parse_datetime("2020-05-01")
        );
        assert!(parse_datetime("01/05/2020").is_none());
    }
}
