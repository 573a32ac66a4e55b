use docindex_search::{break_into_chunks, extract_text_blocks, Bm25Index, TextSearch};
use serde_json::json;

fn index_object(index: &mut Bm25Index, id: &str, data: serde_json::Value) -> usize {
    let blocks = extract_text_blocks(data.as_object().unwrap());
    let chunks = break_into_chunks(&blocks, 80).unwrap();
    let count = chunks.len();
    index.insert(id, &chunks);
    count
}

#[test]
fn extracted_objects_are_searchable() {
    let mut index = Bm25Index::new();
    index_object(
        &mut index,
        "task1",
        json!({ "title": "Repair the roof", "assignedTo": { "/": "s:d:john" } }),
    );
    index_object(
        &mut index,
        "task2",
        json!({ "title": "Paint the fence", "notes": ["buy white paint"] }),
    );

    let results = index.search("paint", 10).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "task2");

    // Reference targets are not text.
    assert!(index.search("john", 10).unwrap().is_empty());
}

#[test]
fn long_text_spans_multiple_chunks() {
    let mut index = Bm25Index::new();
    let body = "Elephant seals migrate thousands of kilometers. ".repeat(10);
    let chunks = index_object(&mut index, "article", json!({ "body": body }));
    assert!(chunks > 1);
    assert_eq!(index.search("kilometers", 5).unwrap()[0].0, "article");
}
