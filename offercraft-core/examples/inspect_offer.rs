use offercraft_core::reader::parser_utils::cell_ref;
use offercraft_core::reader::{OfferWorkbook, read_document};
use offercraft_core::transform::{RowKind, SkipReason, classify_row};
use std::env;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <offer.xlsx>", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let bytes = read_document(path)?;
    let workbook = OfferWorkbook::from_bytes(&bytes)?;
    let sheet = &workbook.sheet;

    println!("File: {}", path);
    println!("Active sheet: {} ({})", workbook.sheet_name, sheet.path);
    println!("Merged ranges: {}", sheet.merges().ranges().len());

    let Some(last_row) = sheet.last_row() else {
        println!("Sheet is empty");
        return Ok(());
    };

    for row in 0..=last_row {
        match classify_row(sheet, &workbook.styles, row) {
            RowKind::Skip(SkipReason::MissingValues) => {}
            RowKind::Skip(reason) => println!("{:>5}  skip      {}", row + 1, reason.as_str()),
            RowKind::LineItem(item) => println!(
                "{:>5}  item      qty {} x {} at {}",
                row + 1,
                item.quantity,
                item.price,
                cell_ref(item.price_cell.0, item.price_cell.1)
            ),
            RowKind::Subtotal(subtotal) => println!(
                "{:>5}  subtotal  '{}' -> {} ({})",
                row + 1,
                subtotal.label,
                cell_ref(subtotal.target.0, subtotal.target.1),
                subtotal.number_format.as_deref().unwrap_or("General")
            ),
            RowKind::GrandTotal(total) => println!(
                "{:>5}  total     -> {}",
                row + 1,
                cell_ref(total.target.0, total.target.1)
            ),
        }
    }

    Ok(())
}
