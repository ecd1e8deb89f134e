use almox::commands::{backup, journal, ledger, repair};
use almox::model::{Classification, EntradaRecord, StockItem, Table};
use almox::store::backup_path;
use almox::store::fs_backend::FsBackend;
use almox::store::Store;
use std::fs;

fn store(dir: &std::path::Path) -> Store<FsBackend> {
    Store::with_backend(FsBackend::new(dir.to_path_buf()))
}

fn register(store: &Store<FsBackend>, description: &str, quantity: f64) {
    ledger::register(
        store,
        ledger::NewItem {
            description: description.into(),
            classification: Some(Classification::Preventivo),
            quantity,
            unit_value: 4.0,
            location: "B1".into(),
        },
        1,
    )
    .unwrap();
}

#[test]
fn test_rewrite_keeps_previous_copy_on_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = store(temp_dir.path());

    register(&store, "FILTRO", 2.0);
    let before = fs::read(temp_dir.path().join("Planilhas/Estoque.csv")).unwrap();

    ledger::apply_delta(&store, "1", 7.0).unwrap();

    let copy = fs::read(temp_dir.path().join(backup_path(&Table::Estoque.path()))).unwrap();
    assert_eq!(copy, before);
    assert_eq!(ledger::find_by_code(&store, "1").unwrap().total_value, 28.0);

    let leftovers: Vec<_> = fs::read_dir(temp_dir.path().join("Planilhas"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_legacy_files_load_and_accept_appends() {
    let temp_dir = tempfile::tempdir().unwrap();
    let sheets = temp_dir.path().join("Planilhas");
    fs::create_dir_all(&sheets).unwrap();
    fs::write(
        sheets.join("Estoque.csv"),
        "CODIGO,DESCRICAO,VALOR UN,VALOR TOTAL,QUANTIDADE,DATA,LOCALIZACAO,NF/PEDIDO\n\
         3,CORREIA,10,20,2,10:00 01/01/2024,C3,NF-OLD\n",
    )
    .unwrap();
    fs::write(
        sheets.join("Entrada.csv"),
        "CODIGO,DESCRICAO,QUANTIDADE,VALOR UN,VALOR TOTAL,DATA\n3,CORREIA,2,10,20,10:00 01/01/2024\n",
    )
    .unwrap();

    let store = store(temp_dir.path());
    let item = ledger::find_by_code(&store, "3").unwrap();
    assert_eq!(item.classification, None);
    assert_eq!(item.references, vec!["NF-OLD".to_string()]);
    assert_eq!(ledger::next_code(&store, 1).unwrap(), "4");

    journal::record_entrada(
        &store,
        journal::EntradaInput {
            code: "3".into(),
            quantity: 1.0,
            operator: "ANA".into(),
            po_reference: Some("NF-NEW".into()),
            issue_date: Some("08:00 02/01/25".into()),
        },
    )
    .unwrap();

    let rows = store.load::<EntradaRecord>().rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].code, "3");
    assert_eq!(rows[0].quantity, 2.0);
    assert_eq!(rows[1].operator, "ANA");
    assert_eq!(rows[1].issue_date, "08:00 02/01/25");

    let item = ledger::find_by_code(&store, "3").unwrap();
    assert_eq!(item.quantity, 3.0);
    assert_eq!(
        item.references,
        vec!["NF-OLD".to_string(), "NF-NEW".to_string()]
    );
}

#[test]
fn test_repair_on_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let sheets = temp_dir.path().join("Planilhas");
    fs::create_dir_all(&sheets).unwrap();
    fs::write(
        sheets.join("Estoque.csv"),
        "CODIGO,DESCRICAO,VALOR UN,VALOR TOTAL,QUANTIDADE\n1,FITA,2,0,3\n",
    )
    .unwrap();

    let store = store(temp_dir.path());
    let result = repair::repair(&store).unwrap();
    assert!(!result.has_failed_steps());

    let rows = store.load::<StockItem>().rows;
    assert_eq!(rows[0].total_value, 6.0);
    assert!(sheets.join("Estoque_backup.csv").exists());
}

#[test]
fn test_backup_sweep_on_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = store(temp_dir.path());
    register(&store, "FILTRO", 1.0);

    let mut sweeper = backup::BackupSweeper::default();
    let result = sweeper.tick(&store, chrono::Local::now()).unwrap();
    assert_eq!(result.paths.len(), 1);

    let backups = temp_dir.path().join("Backups");
    assert!(backups.join(backup::MARKER_FILE).exists());
    let copies = fs::read_dir(&backups)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("_auto.csv"))
        .count();
    assert_eq!(copies, 1);

    assert!(backup::last_sweep(&store).is_some());
}
