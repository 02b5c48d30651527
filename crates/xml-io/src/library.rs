use crate::{parse_bool, parse_num, ParseError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use tech_lib::{Assembly, IoCell, Layer, Test, TestPhase, WaferProcess};
use tracing::info;

/// Collect `(attribute, value)` pairs of one element.
fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, ParseError> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ParseError::Xml(err.to_string()))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

/// Run `handle` over every element named `element` in `path`.
fn for_each_element(
    path: &Path,
    element: &str,
    mut handle: impl FnMut(Vec<(String, String)>) -> Result<(), ParseError>,
) -> Result<(), ParseError> {
    let text = std::fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() == element.as_bytes() {
                    handle(attributes(&e)?)?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(ParseError::Xml(err.to_string())),
        }
    }
    Ok(())
}

fn finish<T>(
    file: &Path,
    name: &str,
    entity: T,
    fully_defined: bool,
    latch: impl FnOnce(T) -> T,
) -> Result<T, ParseError> {
    if !fully_defined {
        return Err(ParseError::Malformed {
            file: file.display().to_string(),
            detail: format!("entity `{name}` is not fully defined"),
        });
    }
    Ok(latch(entity))
}

/// Load and latch the IO cell library.
pub fn load_io_cells(path: &Path) -> Result<Vec<IoCell>, ParseError> {
    let file = path.display().to_string();
    let mut cells = Vec::new();
    for_each_element(path, "io", |attrs| {
        let mut cell = IoCell::new("");
        for (key, value) in attrs {
            match key.as_str() {
                "type" => cell.tag = value,
                "rx_area" => cell.set_rx_area(parse_num(&file, &key, &value)?)?,
                "tx_area" => cell.set_tx_area(parse_num(&file, &key, &value)?)?,
                "shoreline" => cell.set_shoreline(parse_num(&file, &key, &value)?)?,
                "bandwidth" => cell.set_bandwidth(parse_num(&file, &key, &value)?)?,
                "wire_count" => {
                    cell.set_wire_count(parse_num(&file, &key, &value)? as u32)?
                }
                "bidirectional" => cell.set_bidirectional(parse_bool(&file, &key, &value)?)?,
                "energy_per_bit" => cell.set_energy_per_bit(parse_num(&file, &key, &value)?)?,
                "reach" => cell.set_reach(parse_num(&file, &key, &value)?)?,
                _ => {}
            }
        }
        let defined = cell.fully_defined();
        cells.push(finish(path, &cell.tag.clone(), cell, defined, |mut c| {
            c.make_static();
            c
        })?);
        Ok(())
    })?;
    info!(count = cells.len(), path = %path.display(), "io library loaded");
    Ok(cells)
}

/// Load and latch the layer library.
pub fn load_layers(path: &Path) -> Result<Vec<Layer>, ParseError> {
    let file = path.display().to_string();
    let mut layers = Vec::new();
    for_each_element(path, "layer", |attrs| {
        let mut layer = Layer::new("");
        for (key, value) in attrs {
            match key.as_str() {
                "name" => layer.name = value,
                "active" => layer.set_active(parse_bool(&file, &key, &value)?)?,
                "cost_per_mm2" => layer.set_cost_per_mm2(parse_num(&file, &key, &value)?)?,
                "defect_density" => {
                    layer.set_defect_density(parse_num(&file, &key, &value)?)?
                }
                "critical_area_fraction" => {
                    layer.set_critical_area_fraction(parse_num(&file, &key, &value)?)?
                }
                "clustering_factor" => {
                    layer.set_clustering_factor(parse_num(&file, &key, &value)?)?
                }
                "gates_per_mm2" => layer.set_gates_per_mm2(parse_num(&file, &key, &value)?)?,
                "mask_cost" => layer.set_mask_cost(parse_num(&file, &key, &value)?)?,
                _ => {}
            }
        }
        let defined = layer.fully_defined();
        layers.push(finish(path, &layer.name.clone(), layer, defined, |mut l| {
            l.make_static();
            l
        })?);
        Ok(())
    })?;
    info!(count = layers.len(), path = %path.display(), "layer library loaded");
    Ok(layers)
}

/// Load and latch the wafer process library.
pub fn load_wafer_processes(path: &Path) -> Result<Vec<WaferProcess>, ParseError> {
    let file = path.display().to_string();
    let mut wafers = Vec::new();
    for_each_element(path, "wafer_process", |attrs| {
        let mut w = WaferProcess::new("");
        for (key, value) in attrs {
            match key.as_str() {
                "name" => w.name = value,
                "wafer_diameter" => w.set_wafer_diameter(parse_num(&file, &key, &value)?)?,
                "edge_exclusion" => w.set_edge_exclusion(parse_num(&file, &key, &value)?)?,
                "wafer_process_yield" => {
                    w.set_wafer_process_yield(parse_num(&file, &key, &value)?)?
                }
                "dicing_distance" => w.set_dicing_distance(parse_num(&file, &key, &value)?)?,
                "reticle_x" => w.set_reticle_x(parse_num(&file, &key, &value)?)?,
                "reticle_y" => w.set_reticle_y(parse_num(&file, &key, &value)?)?,
                "wafer_fill_grid" => {
                    w.set_wafer_fill_grid(parse_bool(&file, &key, &value)?)?
                }
                "nre_front_end_cost_per_mm2_memory" => {
                    w.set_nre_front_end_cost_per_mm2_memory(parse_num(&file, &key, &value)?)?
                }
                "nre_front_end_cost_per_mm2_logic" => {
                    w.set_nre_front_end_cost_per_mm2_logic(parse_num(&file, &key, &value)?)?
                }
                "nre_front_end_cost_per_mm2_analog" => {
                    w.set_nre_front_end_cost_per_mm2_analog(parse_num(&file, &key, &value)?)?
                }
                "nre_back_end_cost_per_mm2_memory" => {
                    w.set_nre_back_end_cost_per_mm2_memory(parse_num(&file, &key, &value)?)?
                }
                "nre_back_end_cost_per_mm2_logic" => {
                    w.set_nre_back_end_cost_per_mm2_logic(parse_num(&file, &key, &value)?)?
                }
                "nre_back_end_cost_per_mm2_analog" => {
                    w.set_nre_back_end_cost_per_mm2_analog(parse_num(&file, &key, &value)?)?
                }
                _ => {}
            }
        }
        let defined = w.fully_defined();
        wafers.push(finish(path, &w.name.clone(), w, defined, |mut w| {
            w.make_static();
            w
        })?);
        Ok(())
    })?;
    info!(count = wafers.len(), path = %path.display(), "wafer library loaded");
    Ok(wafers)
}

/// Load and latch the assembly process library.
///
/// `separation_override` replaces every process's die separation before
/// the latch is set (the CLI's positional `separation` argument).
pub fn load_assemblies(
    path: &Path,
    separation_override: Option<f64>,
) -> Result<Vec<Assembly>, ParseError> {
    let file = path.display().to_string();
    let mut assemblies = Vec::new();
    for_each_element(path, "assembly", |attrs| {
        let mut a = Assembly::new("");
        for (key, value) in attrs {
            match key.as_str() {
                "name" => a.name = value,
                "materials_cost_per_mm2" => {
                    a.set_materials_cost_per_mm2(parse_num(&file, &key, &value)?)?
                }
                "picknplace_machine_cost" => {
                    a.set_picknplace_machine_cost(parse_num(&file, &key, &value)?)?
                }
                "picknplace_machine_lifetime" => {
                    a.set_picknplace_machine_lifetime_years(parse_num(&file, &key, &value)?)?
                }
                "picknplace_machine_uptime" => {
                    a.set_picknplace_machine_uptime(parse_num(&file, &key, &value)?)?
                }
                "picknplace_technician_yearly_cost" => {
                    a.set_picknplace_technician_yearly_cost(parse_num(&file, &key, &value)?)?
                }
                "picknplace_time" => a.set_picknplace_time_s(parse_num(&file, &key, &value)?)?,
                "picknplace_group" => {
                    a.set_picknplace_group(parse_num(&file, &key, &value)? as u32)?
                }
                "bonding_machine_cost" => {
                    a.set_bonding_machine_cost(parse_num(&file, &key, &value)?)?
                }
                "bonding_machine_lifetime" => {
                    a.set_bonding_machine_lifetime_years(parse_num(&file, &key, &value)?)?
                }
                "bonding_machine_uptime" => {
                    a.set_bonding_machine_uptime(parse_num(&file, &key, &value)?)?
                }
                "bonding_technician_yearly_cost" => {
                    a.set_bonding_technician_yearly_cost(parse_num(&file, &key, &value)?)?
                }
                "bonding_time" => a.set_bonding_time_s(parse_num(&file, &key, &value)?)?,
                "bonding_group" => a.set_bonding_group(parse_num(&file, &key, &value)? as u32)?,
                "die_separation" => a.set_die_separation(parse_num(&file, &key, &value)?)?,
                "edge_exclusion" => a.set_edge_exclusion(parse_num(&file, &key, &value)?)?,
                "max_pad_current_density" => {
                    a.set_max_pad_current_density(parse_num(&file, &key, &value)?)?
                }
                "bonding_pitch" => a.set_bonding_pitch(parse_num(&file, &key, &value)?)?,
                "alignment_yield" => a.set_alignment_yield(parse_num(&file, &key, &value)?)?,
                "bonding_yield" => a.set_bonding_yield(parse_num(&file, &key, &value)?)?,
                "dielectric_bond_defect_density" => {
                    a.set_dielectric_bond_defect_density(parse_num(&file, &key, &value)?)?
                }
                "bb_cost_per_second" => {
                    a.set_bb_cost_per_second(parse_num(&file, &key, &value)?)?
                }
                _ => {}
            }
        }
        if let Some(sep) = separation_override {
            a.set_die_separation(sep)?;
        }
        let defined = a.fully_defined();
        assemblies.push(finish(path, &a.name.clone(), a, defined, |mut a| {
            a.make_static();
            a
        })?);
        Ok(())
    })?;
    info!(count = assemblies.len(), path = %path.display(), "assembly library loaded");
    Ok(assemblies)
}

/// Load and latch the test process library. Phase attributes carry a
/// `self_` or `assembly_` prefix.
pub fn load_tests(path: &Path) -> Result<Vec<Test>, ParseError> {
    let file = path.display().to_string();
    let mut tests = Vec::new();
    for_each_element(path, "test", |attrs| {
        let mut t = Test::new("");
        let mut self_phase = TestPhase::default();
        let mut assembly_phase = TestPhase::default();
        for (key, value) in attrs {
            match key.as_str() {
                "name" => t.name = value,
                "time_per_test_cycle" => {
                    t.set_time_per_test_cycle(parse_num(&file, &key, &value)?)?
                }
                "cost_per_second" => t.set_cost_per_second(parse_num(&file, &key, &value)?)?,
                "samples_per_input" => {
                    t.set_samples_per_input(parse_num(&file, &key, &value)?)?
                }
                "self_defect_coverage" => {
                    self_phase.defect_coverage = Some(parse_num(&file, &key, &value)?)
                }
                "self_test_reuse" => {
                    self_phase.test_reuse = Some(parse_num(&file, &key, &value)?)
                }
                "self_scan_chain_length" => {
                    self_phase.scan_chain_length = Some(parse_num(&file, &key, &value)?)
                }
                "self_scan_chain_count" => {
                    self_phase.scan_chain_count = Some(parse_num(&file, &key, &value)?)
                }
                "self_pattern_count" => {
                    self_phase.pattern_count = Some(parse_num(&file, &key, &value)?)
                }
                "self_failure_dist" => self_phase.failure_dist = value,
                "assembly_defect_coverage" => {
                    assembly_phase.defect_coverage = Some(parse_num(&file, &key, &value)?)
                }
                "assembly_test_reuse" => {
                    assembly_phase.test_reuse = Some(parse_num(&file, &key, &value)?)
                }
                "assembly_scan_chain_length" => {
                    assembly_phase.scan_chain_length = Some(parse_num(&file, &key, &value)?)
                }
                "assembly_scan_chain_count" => {
                    assembly_phase.scan_chain_count = Some(parse_num(&file, &key, &value)?)
                }
                "assembly_pattern_count" => {
                    assembly_phase.pattern_count = Some(parse_num(&file, &key, &value)?)
                }
                "assembly_failure_dist" => assembly_phase.failure_dist = value,
                _ => {}
            }
        }
        t.set_self_phase(self_phase)?;
        t.set_assembly_phase(assembly_phase)?;
        let defined = t.fully_defined();
        tests.push(finish(path, &t.name.clone(), t, defined, |mut t| {
            t.make_static();
            t
        })?);
        Ok(())
    })?;
    info!(count = tests.len(), path = %path.display(), "test library loaded");
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("chiplet_part_test_{}_{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn io_library_roundtrip() {
        let path = write_temp(
            "io.xml",
            r#"<ios>
  <io type="UCIe_standard" rx_area="0.005" tx_area="0.005" shoreline="0.05"
      bandwidth="32" wire_count="16" bidirectional="true"
      energy_per_bit="0.5" reach="2.0"/>
  <io type="GPIO" rx_area="0.001" tx_area="0.001" shoreline="0.02"
      bandwidth="4" wire_count="1" bidirectional="false"
      energy_per_bit="2.0" reach="10.0"/>
</ios>"#,
        );
        let cells = load_io_cells(&path).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].tag, "UCIe_standard");
        assert_eq!(cells[0].bandwidth_gbps, Some(32.0));
        assert!(cells[0].is_static());
        assert!(cells[0].fully_defined());
        assert_eq!(cells[1].direction_factor(), 1.0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn incomplete_entity_is_fatal() {
        let path = write_temp(
            "io_bad.xml",
            r#"<ios><io type="X" rx_area="0.005"/></ios>"#,
        );
        let err = load_io_cells(&path).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn wafer_library_parses_nre_table() {
        let path = write_temp(
            "wafer.xml",
            r#"<wafer_processes>
  <wafer_process name="7nm" wafer_diameter="300" edge_exclusion="3"
      wafer_process_yield="0.98" dicing_distance="0.1" reticle_x="26"
      reticle_y="33" wafer_fill_grid="false"
      nre_front_end_cost_per_mm2_memory="1000"
      nre_front_end_cost_per_mm2_logic="3000"
      nre_front_end_cost_per_mm2_analog="5000"
      nre_back_end_cost_per_mm2_memory="500"
      nre_back_end_cost_per_mm2_logic="2000"
      nre_back_end_cost_per_mm2_analog="4000"/>
</wafer_processes>"#,
        );
        let wafers = load_wafer_processes(&path).unwrap();
        assert_eq!(wafers.len(), 1);
        assert_eq!(wafers[0].name, "7nm");
        assert_eq!(wafers[0].nre_design_cost_per_mm2(0.0, 1.0, 0.0), 5000.0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn assembly_library_with_separation_override() {
        let path = write_temp(
            "assembly.xml",
            r#"<assembly_processes>
  <assembly name="organic_55" materials_cost_per_mm2="0.01"
      picknplace_machine_cost="1000000" picknplace_machine_lifetime="5"
      picknplace_machine_uptime="0.9"
      picknplace_technician_yearly_cost="100000" picknplace_time="10"
      picknplace_group="1"
      bonding_machine_cost="2000000" bonding_machine_lifetime="5"
      bonding_machine_uptime="0.9"
      bonding_technician_yearly_cost="100000" bonding_time="20"
      bonding_group="1"
      die_separation="0.1" edge_exclusion="0.1"
      max_pad_current_density="100" bonding_pitch="0.11"
      alignment_yield="0.999" bonding_yield="0.9999"
      dielectric_bond_defect_density="0.0001"/>
</assembly_processes>"#,
        );
        let plain = load_assemblies(&path, None).unwrap();
        assert_eq!(plain[0].die_separation_mm, Some(0.1));
        let overridden = load_assemblies(&path, Some(0.25)).unwrap();
        assert_eq!(overridden[0].die_separation_mm, Some(0.25));
        assert!(overridden[0].is_static());
        assert!(overridden[0].picknplace_cost_per_second().unwrap() > 0.0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_library_splits_phases() {
        let path = write_temp(
            "test.xml",
            r#"<test_processes>
  <test name="KGD" time_per_test_cycle="1e-9" cost_per_second="0.01"
      samples_per_input="1"
      self_defect_coverage="0.9" self_test_reuse="1"
      self_scan_chain_length="1000" self_scan_chain_count="10"
      self_failure_dist="normal"
      assembly_defect_coverage="0.8" assembly_test_reuse="2"
      assembly_scan_chain_length="500" assembly_scan_chain_count="4"
      assembly_failure_dist="exponential"/>
</test_processes>"#,
        );
        let tests = load_tests(&path).unwrap();
        assert_eq!(tests.len(), 1);
        let t = &tests[0];
        assert_eq!(t.self_phase.defect_coverage, Some(0.9));
        assert_eq!(t.assembly_phase.defect_coverage, Some(0.8));
        assert_eq!(t.assembly_phase.failure_dist, "exponential");
        assert!(t.is_static());
        std::fs::remove_file(path).ok();
    }
}
