//! End-to-end behaviour of the harvesting server through its public surfaces.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use roxmltree::{Document, Node};

use oai_harvest_server::{
    CanonicalMetadata, ErrorCode, HarvestingServer, InMemoryRecordStore, OaiResponse, Record,
    Requester, ServerConfig, SetRequest,
};

const OAI_NS: &str = "http://www.openarchives.org/OAI/2.0/";

fn pid(n: u32) -> String {
    format!("doi:10.5072/FK2/REC{n:03}")
}

fn record(n: u32, title: &str) -> Record {
    Record {
        identifier: pid(n),
        datestamp: Utc.with_ymd_and_hms(2023, 6, 1, 9, 0, 0).unwrap() + chrono::Duration::hours(n as i64),
        metadata: CanonicalMetadata {
            persistent_id: pid(n),
            title: title.to_string(),
            authors: vec!["Finch, Fiona".to_string()],
            description: Some(format!("Dataset number {n}")),
            subjects: vec!["Earth and Environmental Sciences".to_string()],
            publisher: Some("Root Dataverse".to_string()),
            publication_date: Some("2023-06-01".to_string()),
            ..Default::default()
        },
    }
}

struct Harness {
    store: Arc<InMemoryRecordStore>,
    server: Arc<HarvestingServer>,
    admin: Requester,
}

impl Harness {
    fn new(count: u32, page_size: usize) -> Self {
        let store = Arc::new(InMemoryRecordStore::with_records(
            (1..=count).map(|n| record(n, &format!("Survey {n}"))),
        ));
        let config = ServerConfig::new("http://localhost:8080/oai").with_page_size(page_size);
        let server = Arc::new(HarvestingServer::new(config, store.clone()).unwrap());
        Self {
            store,
            server,
            admin: Requester::superuser("dataverseAdmin"),
        }
    }

    fn create(&self, name: &str, definition: &str, description: Option<&str>) {
        let request = SetRequest {
            name: name.to_string(),
            definition: definition.to_string(),
            description: description.map(str::to_string),
        };
        let resp = self.server.management().create_set(&self.admin, &request).unwrap();
        assert_eq!(resp.status, 201);
    }

    async fn export(&self, name: &str) {
        let (resp, handle) = self.server.management().export_set(&self.admin, name).unwrap();
        assert_eq!(resp.status, 200);
        handle.wait().await.unwrap();
    }

    async fn query(&self, query: &str) -> OaiResponse {
        self.server.handle_query(query).await.unwrap()
    }

    async fn error(&self, query: &str) -> Option<ErrorCode> {
        self.query(query).await.errors().first().map(|e| e.code)
    }
}

fn children<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Vec<Node<'a, 'input>> {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .collect()
}

fn header_identifiers(doc: &Document) -> Vec<String> {
    children(doc.root_element(), "header")
        .into_iter()
        .filter_map(|h| {
            h.children()
                .find(|c| c.tag_name().name() == "identifier")
                .and_then(|c| c.text())
                .map(str::to_string)
        })
        .collect()
}

fn resumption_token<'a, 'input>(doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    children(doc.root_element(), "resumptionToken").into_iter().next()
}

#[tokio::test]
async fn test_created_set_reads_back_unchanged() {
    let h = Harness::new(3, 10);
    h.create("surveys", "title:survey", Some("All the surveys"));

    let got = h.server.management().get_set("surveys").unwrap();
    assert_eq!(got.status, 200);
    assert_eq!(got.data()["name"], "surveys");
    assert_eq!(got.data()["definition"], "title:survey");
    assert_eq!(got.data()["description"], "All the surveys");

    let xml = h.query("verb=ListSets").await.to_xml();
    let doc = Document::parse(&xml).unwrap();
    let field = children(doc.root_element(), "setDescription")
        .into_iter()
        .flat_map(|d| children(d, "field"))
        .next()
        .unwrap();
    assert_eq!(field.text(), Some("All the surveys"));
    assert_eq!(field.parent().unwrap().tag_name().name(), "element");
}

#[tokio::test]
async fn test_duplicate_name_differing_in_case_is_rejected() {
    let h = Harness::new(1, 10);
    h.create("Surveys", "*", None);

    let err = h
        .server
        .management()
        .create_set(
            &h.admin,
            &SetRequest {
                name: "surveys".to_string(),
                definition: "title:other".to_string(),
                description: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.status, 400);

    let list = h.server.management().list_sets().unwrap();
    let sets = list.data()["oaisets"].as_array().unwrap().clone();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0]["definition"], "*");
}

#[tokio::test]
async fn test_set_listing_is_stable_until_reexport() {
    let h = Harness::new(3, 10);
    h.create("all", "*", None);
    h.export("all").await;

    h.store.upsert(record(4, "Late survey"));
    let xml = h
        .query("verb=ListIdentifiers&metadataPrefix=oai_dc&set=all")
        .await
        .to_xml();
    let doc = Document::parse(&xml).unwrap();
    assert_eq!(header_identifiers(&doc), vec![pid(1), pid(2), pid(3)]);

    h.export("all").await;
    let xml = h
        .query("verb=ListIdentifiers&metadataPrefix=oai_dc&set=all")
        .await
        .to_xml();
    let doc = Document::parse(&xml).unwrap();
    assert_eq!(header_identifiers(&doc).len(), 4);
}

#[tokio::test]
async fn test_list_records_pages_through_everything_once() {
    let h = Harness::new(10, 4);
    let mut delivered = Vec::new();
    let mut query = "verb=ListRecords&metadataPrefix=oai_dc".to_string();
    let mut cursors = Vec::new();

    loop {
        let xml = h.query(&query).await.to_xml();
        let doc = Document::parse(&xml).unwrap();
        delivered.extend(header_identifiers(&doc));

        let token = resumption_token(&doc).unwrap();
        assert_eq!(token.attribute("completeListSize"), Some("10"));
        cursors.push(token.attribute("cursor").unwrap().to_string());
        match token.text() {
            Some(value) => {
                assert!(token.attribute("expirationDate").is_some());
                query = format!("verb=ListRecords&resumptionToken={value}");
            }
            None => break,
        }
    }

    let expected: Vec<String> = (1..=10).map(pid).collect();
    assert_eq!(delivered, expected);
    assert_eq!(cursors, vec!["0", "4", "8"]);
}

#[tokio::test]
async fn test_single_page_listing_has_no_token() {
    let h = Harness::new(3, 10);
    let xml = h.query("verb=ListRecords&metadataPrefix=oai_dc").await.to_xml();
    let doc = Document::parse(&xml).unwrap();
    assert_eq!(header_identifiers(&doc).len(), 3);
    assert!(resumption_token(&doc).is_none());
}

#[tokio::test]
async fn test_deleted_set_disappears() {
    let h = Harness::new(2, 10);
    h.create("keep", "*", None);
    h.create("drop", "*", None);
    h.export("drop").await;

    let resp = h.server.management().delete_set(&h.admin, "drop").await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(h.server.management().get_set("drop").unwrap_err().status, 404);

    let xml = h.query("verb=ListSets").await.to_xml();
    let doc = Document::parse(&xml).unwrap();
    let specs: Vec<&str> = children(doc.root_element(), "setSpec")
        .into_iter()
        .filter_map(|n| n.text())
        .collect();
    assert_eq!(specs, vec!["keep"]);

    // The name is free again once the delete returned.
    h.create("drop", "title:survey", None);
}

#[tokio::test]
async fn test_reexport_invalidates_outstanding_tokens() {
    let h = Harness::new(6, 2);
    h.create("all", "*", None);
    h.export("all").await;

    let xml = h
        .query("verb=ListIdentifiers&metadataPrefix=oai_dc&set=all")
        .await
        .to_xml();
    let doc = Document::parse(&xml).unwrap();
    let token = resumption_token(&doc).unwrap().text().unwrap().to_string();

    h.export("all").await;
    assert_eq!(
        h.error(&format!("verb=ListIdentifiers&resumptionToken={token}")).await,
        Some(ErrorCode::BadResumptionToken)
    );
}

#[tokio::test]
async fn test_exactly_five_formats_are_listed() {
    let h = Harness::new(1, 10);
    let xml = h.query("verb=ListMetadataFormats").await.to_xml();
    let doc = Document::parse(&xml).unwrap();
    let mut prefixes: Vec<&str> = children(doc.root_element(), "metadataPrefix")
        .into_iter()
        .filter_map(|n| n.text())
        .collect();
    prefixes.sort();
    assert_eq!(
        prefixes,
        vec!["Datacite", "dataverse_json", "oai_datacite", "oai_dc", "oai_ddi"]
    );
}

#[tokio::test]
async fn test_get_record_checks_identifier_before_prefix() {
    let h = Harness::new(1, 10);
    assert_eq!(
        h.error("verb=GetRecord&identifier=doi:10.5072/FK2/NOPE&metadataPrefix=bogus")
            .await,
        Some(ErrorCode::IdDoesNotExist)
    );
    let known = format!("verb=GetRecord&identifier={}&metadataPrefix=bogus", pid(1));
    assert_eq!(h.error(&known).await, Some(ErrorCode::CannotDisseminateFormat));

    let ok = format!("verb=GetRecord&identifier={}&metadataPrefix=oai_dc", pid(1));
    let xml = h.query(&ok).await.to_xml();
    let doc = Document::parse(&xml).unwrap();
    let identifier = children(doc.root_element(), "identifier")
        .into_iter()
        .find(|n| n.tag_name().namespace() == Some("http://purl.org/dc/elements/1.1/"))
        .unwrap();
    assert_eq!(identifier.text(), Some("https://doi.org/10.5072/FK2/REC001"));
}

#[tokio::test]
async fn test_datacite_payload_has_no_prolog() {
    let h = Harness::new(3, 10);
    let xml = h.query("verb=ListRecords&metadataPrefix=Datacite").await.to_xml();
    assert_eq!(xml.matches("<?xml").count(), 1);
    assert!(xml.starts_with("<?xml"));

    let doc = Document::parse(&xml).unwrap();
    assert_eq!(doc.root_element().tag_name().namespace(), Some(OAI_NS));
    let roots: Vec<&str> = children(doc.root_element(), "metadata")
        .into_iter()
        .filter_map(|m| m.first_element_child())
        .map(|n| n.tag_name().name())
        .collect();
    assert_eq!(roots, vec!["resource", "resource", "resource"]);
}

#[tokio::test]
async fn test_set_definitions_select_records() {
    let h = Harness::new(3, 10);
    h.store.upsert(record(7, "New survey"));
    h.create("new", "title:New", None);
    h.create("one", "dsPersistentId:REC002", None);
    h.export("new").await;
    h.export("one").await;

    for (set, expected) in [("new", vec![pid(7)]), ("one", vec![pid(2)])] {
        let xml = h
            .query(&format!("verb=ListIdentifiers&metadataPrefix=oai_dc&set={set}"))
            .await
            .to_xml();
        let doc = Document::parse(&xml).unwrap();
        assert_eq!(header_identifiers(&doc), expected, "set {set}");
        let specs: Vec<&str> = children(doc.root_element(), "setSpec")
            .into_iter()
            .filter_map(|n| n.text())
            .collect();
        assert_eq!(specs, vec![set]);
    }
}

#[tokio::test]
async fn test_request_echo() {
    let h = Harness::new(1, 10);
    let xml = h.query("verb=ListRecords&metadataPrefix=oai_dc").await.to_xml();
    let doc = Document::parse(&xml).unwrap();
    let request = children(doc.root_element(), "request").remove(0);
    assert_eq!(request.attribute("verb"), Some("ListRecords"));
    assert_eq!(request.attribute("metadataPrefix"), Some("oai_dc"));
    assert_eq!(request.text(), Some("http://localhost:8080/oai"));

    let xml = h.query("verb=ListRecords&bogus=1").await.to_xml();
    let doc = Document::parse(&xml).unwrap();
    let request = children(doc.root_element(), "request").remove(0);
    assert_eq!(request.attributes().count(), 0);
    let error = children(doc.root_element(), "error").remove(0);
    assert_eq!(error.attribute("code"), Some("badArgument"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_record_renders_once() {
    let h = Harness::new(1, 10);
    let query = format!("verb=GetRecord&identifier={}&metadataPrefix=oai_ddi", pid(1));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let server = Arc::clone(&h.server);
        let query = query.clone();
        tasks.push(tokio::spawn(async move {
            server.handle_query(&query).await.unwrap().to_xml()
        }));
    }
    let mut bodies = Vec::new();
    for task in tasks {
        bodies.push(task.await.unwrap());
    }

    assert_eq!(h.server.cache().computations(), 1);
    assert!(bodies.iter().all(|b| b.contains("codeBook")));
}
