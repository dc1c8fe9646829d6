/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Periodic table lookups
//!
//! Element symbols by atomic number and resolution of crystallographic
//! site labels such as `Fe1`, `O2-` or `CA` to an element.

/// Element symbols ordered by atomic number, starting with hydrogen
const SYMBOLS: [&str; 103] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr",
];

/// Provides element symbols for atomic numbers
pub fn element_symbol(atomic_number: i32) -> Option<&'static str> {
    if atomic_number < 1 {
        return None;
    }
    SYMBOLS.get(atomic_number as usize - 1).copied()
}

/// Atomic number of an element symbol, case-insensitive
pub fn atomic_number_from_symbol(symbol: &str) -> Option<i32> {
    SYMBOLS
        .iter()
        .position(|s| s.eq_ignore_ascii_case(symbol))
        .map(|i| i as i32 + 1)
}

/// Resolve a site label to an element by the longest matching symbol prefix
///
/// Only the leading letters are considered, so `Fe1`, `FE` and `Fe3+` all
/// resolve to iron while `Co1` resolves to cobalt rather than carbon.
pub fn element_from_label(label: &str) -> Option<&'static str> {
    let letters: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .take(2)
        .collect();
    (1..=letters.len())
        .rev()
        .find_map(|n| atomic_number_from_symbol(&letters[..n]))
        .and_then(element_symbol)
}
