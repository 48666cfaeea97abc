use std::env;

use voxmap::{DataType, load_image, save_image};

fn main() -> voxmap::Result<()> {
    let mut args = env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "dicom".to_string());
    let output = args.next().unwrap_or_else(|| "result.nii.gz".to_string());

    let image = load_image(&input)?;
    println!("{input}: shape {:?}", image.shape());
    println!("{}", image.affine());
    if let Ok(header) = image.header() {
        for (key, value) in header.iter() {
            println!("  {key}: {value:?}");
        }
    }

    let saved = save_image(&image, &output, Some(DataType::F32))?;
    println!("wrote {output}: shape {:?}", saved.shape());
    Ok(())
}
