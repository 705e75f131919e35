//! Load, filter, pick, edit and export a catalog the way the grids do

use catalog_curator_lib::application::{CurationSession, ExportTransformer};
use catalog_curator_lib::domain::{CellInput, Dataset, SortColumn, SortOrder, columns};
use catalog_curator_lib::infrastructure::config::ExportConfig;
use catalog_curator_lib::infrastructure::csv_store::{
    OutputEncoding, SourceEncoding, load_dataset, save_dataset,
};
use tempfile::TempDir;

const SOURCE: &str = "\
Kat. číslo;Názov tovaru;Hlavna kategória;SEO titulka;Obrázky;Bežná cena
vt-100;Chladiaca vitrína;Vitríny/Chladiace vitríny;;https://x/1.jpg, https://x/2.jpg;1299
hr-200;Hrniec 20 l;Kuchyňa/Hrnce;;;49
st-300;Stolička;Nábytok;Pohodlná stolička;https://x/3.jpg;35
vt-400;Teplá vitrína;Vitríny/Teplé vitríny;;;899
";

async fn load_source(dir: &TempDir) -> Dataset {
    let path = dir.path().join("source.csv");
    tokio::fs::write(&path, SOURCE).await.unwrap();
    let (dataset, encoding) = load_dataset(&path).await.unwrap();
    assert_eq!(encoding, SourceEncoding::Utf8);
    dataset
}

#[tokio::test]
async fn filter_pick_and_export() {
    let dir = TempDir::new().unwrap();
    let mut session = CurationSession::new();
    session.load_input(load_source(&dir).await);

    let categories = session.categories();
    assert_eq!(categories.len(), 4);
    let vitriny: Vec<String> = categories
        .iter()
        .filter(|c| c.starts_with("Vitríny"))
        .cloned()
        .collect();

    let outcome = session.apply_filter(&vitriny, true);
    assert_eq!(outcome.visible, 3);
    assert_eq!(outcome.preserved_by_seo, 1);

    // price descending: vt-100, vt-400, hr-200, st-300
    session.input_mut().sort(SortColumn::Data(5), SortOrder::Descending);
    assert_eq!(session.input().display_value(0, 1), Some("vt-100"));
    session.input_mut().set_data(0, 0, CellInput::Check(true));
    session.input_mut().set_data(1, 0, CellInput::Check(true));

    // re-sorting must not change which products are picked
    session.input_mut().sort(SortColumn::Data(0), SortOrder::Ascending);
    assert_eq!(session.add_checked_to_output(), 2);
    assert_eq!(session.output_dataset().value(0, columns::CODE), Some("vt-100"));
    assert_eq!(session.output_dataset().value(1, columns::CODE), Some("vt-400"));

    assert!(session.output_mut().set_data(1, 2, CellInput::Text("Teplá vitrína GN".into())));
    assert!(session.output().is_modified(1, 2));

    let exported =
        ExportTransformer::new(ExportConfig::default()).transform(session.output_dataset());
    let path = dir.path().join("export").join("eshop.csv");
    save_dataset(&path, &exported, OutputEncoding::Utf8Bom).await.unwrap();

    let bytes = tokio::fs::read(&path).await.unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));

    let (reloaded, encoding) = load_dataset(&path).await.unwrap();
    assert_eq!(encoding, SourceEncoding::Utf8Bom);
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.columns()[0], "code");
    assert_eq!(reloaded.value(0, "code"), Some("VT-100"));
    assert_eq!(reloaded.value(0, "image"), Some("https://x/2.jpg"));
    assert_eq!(
        reloaded.value(1, "defaultCategory"),
        Some("Tovary a kategórie > Vitríny > Teplé vitríny")
    );
    assert_eq!(reloaded.value(1, "name"), Some("Teplá vitrína GN"));
    assert_eq!(reloaded.value(1, "currency"), Some("EUR"));
}

#[tokio::test]
async fn input_grid_is_read_only() {
    let dir = TempDir::new().unwrap();
    let mut session = CurationSession::new();
    session.load_input(load_source(&dir).await);

    assert!(!session.input_mut().set_data(0, 2, CellInput::Text("Iné".into())));
    assert_eq!(session.input().display_value(0, 2), Some("Chladiaca vitrína"));
    assert_eq!(session.input().column_count(), 7);
    assert_eq!(session.input().header(0), Some("Vybrať"));
}
